//! Entity and index declarations the compiler navigates.
//!
//! A [`Catalog`] is the plain-data form of the object model: classes, their
//! superclass chain, properties with their association kind, declared table
//! indexes and annotation-style index declarations. Deployments either build
//! one in code or ship it as JSON. Anything implementing [`EntityCatalog`]
//! can stand in for it.

use serde::{Deserialize, Serialize};

/// Superclass chains longer than this are treated as cycles
const MAX_SUPERCLASS_DEPTH: usize = 32;

/// What kind of value a property holds
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
    #[default]
    Scalar,
    /// Single-valued association stored as a foreign key column
    ManyToOne { target: String },
    /// Entity collection; `inverse` names the property on `target` pointing back at the owner
    OneToMany {
        target: String,
        #[serde(default)]
        inverse: Option<String>,
    },
    /// Collection of plain values kept in an intermediate table
    ScalarCollection,
}

impl PropertyKind {
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany { .. } | Self::ScalarCollection)
    }

    /// Class reached by navigating through this property
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::ManyToOne { target } | Self::OneToMany { target, .. } => Some(target),
            Self::Scalar | Self::ScalarCollection => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Column name, defaults to the property name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub kind: PropertyKind,
}

fn default_nullable() -> bool {
    true
}

impl PropertyDescriptor {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            nullable: true,
            unique: false,
            kind: PropertyKind::Scalar,
        }
    }

    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::ManyToOne {
                target: target.into(),
            },
            ..Self::scalar(name)
        }
    }

    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: Option<&str>,
    ) -> Self {
        Self {
            kind: PropertyKind::OneToMany {
                target: target.into(),
                inverse: inverse.map(str::to_string),
            },
            ..Self::scalar(name)
        }
    }

    pub fn scalar_collection(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::ScalarCollection,
            ..Self::scalar(name)
        }
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Index declared on a table, as read from the schema or the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDecl {
    pub name: String,
    pub columns: Vec<String>,
}

impl IndexDecl {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Case-insensitive indexes are recognised by naming convention
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.name.ends_with("_ci") || self.name.ends_with("_csi")
    }
}

/// Index declared on a class rather than in the schema
///
/// Either `property` is set, or `column` and `table` name a column of an
/// intermediate table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationIndex {
    pub class: String,
    pub name: String,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    /// Apply to every mapped subclass that has the indexed properties
    #[serde(default)]
    pub sub_classes: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl AnnotationIndex {
    pub fn on_property(
        class: impl Into<String>,
        name: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            property: Some(property.into()),
            column: None,
            table: None,
            case_sensitive: true,
            sub_classes: false,
        }
    }

    pub fn on_column(
        class: impl Into<String>,
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            property: None,
            column: Some(column.into()),
            table: Some(table.into()),
            case_sensitive: true,
            sub_classes: false,
        }
    }

    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    #[must_use]
    pub fn for_sub_classes(mut self) -> Self {
        self.sub_classes = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub indexes: Vec<IndexDecl>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            superclass: None,
            is_abstract: false,
            properties: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn index(mut self, name: &str, columns: &[&str]) -> Self {
        self.indexes.push(IndexDecl::new(name, columns));
        self
    }

    /// Declared property, not looking at superclasses
    #[must_use]
    pub fn own_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Source of entity metadata for the compiler
///
/// Only [`entities`](Self::entities) and
/// [`annotation_indexes`](Self::annotation_indexes) are required; navigation
/// helpers are derived from them.
pub trait EntityCatalog: Send + Sync {
    fn entities(&self) -> &[EntityDescriptor];

    fn annotation_indexes(&self) -> &[AnnotationIndex];

    fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities().iter().find(|e| e.name == name)
    }

    /// The class followed by its superclasses, nearest first
    fn lineage(&self, name: &str) -> Vec<&EntityDescriptor> {
        let mut chain = Vec::new();
        let mut current = self.entity(name);
        while let Some(entity) = current {
            if chain.len() >= MAX_SUPERCLASS_DEPTH {
                tracing::warn!(class = name, "Superclass chain too deep, possible cycle");
                break;
            }
            chain.push(entity);
            current = entity.superclass.as_deref().and_then(|s| self.entity(s));
        }
        chain
    }

    /// Property declared on the class or inherited from a superclass
    fn property(&self, class: &str, name: &str) -> Option<&PropertyDescriptor> {
        self.lineage(class)
            .into_iter()
            .find_map(|entity| entity.own_property(name))
    }

    /// Property on the element type of `owner.collection` pointing back at the owner
    fn inverse_property(&self, owner: &str, collection: &str) -> Option<String> {
        match &self.property(owner, collection)?.kind {
            PropertyKind::OneToMany { inverse, .. } => inverse.clone(),
            _ => None,
        }
    }

    /// Whether `class` is `ancestor` or inherits from it
    fn is_assignable(&self, ancestor: &str, class: &str) -> bool {
        self.lineage(class).iter().any(|e| e.name == ancestor)
    }
}

/// In-memory catalog, buildable in code or loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
    #[serde(default)]
    pub annotation_indexes: Vec<AnnotationIndex>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from its JSON form
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the document is not a valid catalog.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn with_annotation_index(mut self, index: AnnotationIndex) -> Self {
        self.annotation_indexes.push(index);
        self
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut EntityDescriptor> {
        self.entities.iter_mut().find(|e| e.name == name)
    }
}

impl EntityCatalog for Catalog {
    fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    fn annotation_indexes(&self) -> &[AnnotationIndex] {
        &self.annotation_indexes
    }
}
