use super::catalog::{AnnotationIndex, EntityCatalog, EntityDescriptor, PropertyKind};
use std::collections::HashMap;

/// Index and case-sensitivity facts for one property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMapping {
    pub name: String,
    /// Covered by a schema index
    pub has_normal_index: bool,
    /// Covered by a schema index named as case-insensitive
    pub case_insensitive_from_index: bool,
    /// Covered by an annotation index of either sensitivity
    pub has_annotation_index: bool,
    /// Covered by a case-insensitive annotation index
    pub case_insensitive_from_annotation: bool,
    /// Column is unique, which implies a case-insensitive index
    pub unique_constraint: bool,
    pub nullable: bool,
}

impl PropertyMapping {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive_from_index
            || self.case_insensitive_from_annotation
            || self.unique_constraint
    }
}

/// Property facts for one mapped class, own and inherited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub class_name: String,
    pub table_name: String,
    pub is_abstract: bool,
    properties: HashMap<String, PropertyMapping>,
}

impl ClassMapping {
    /// Empty mapping holding only the implicit `id` property
    pub fn new(class_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        let mut mapping = Self {
            class_name: class_name.into(),
            table_name: table_name.into(),
            is_abstract: false,
            properties: HashMap::new(),
        };
        mapping.add_property(PropertyMapping::new("id"));
        mapping
    }

    pub fn add_property(&mut self, property: PropertyMapping) {
        self.properties.insert(property.name.to_lowercase(), property);
    }

    /// Case-insensitive property lookup
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyMapping> {
        self.properties.get(&name.to_lowercase())
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyMapping> {
        self.properties.get_mut(&name.to_lowercase())
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyMapping> {
        self.properties.values()
    }

    /// Build the mapping for `entity` from its own and inherited declarations
    ///
    /// Schema indexes are correlated back to properties through their first
    /// column. Index names starting with `_` are skipped.
    pub fn build(entity: &EntityDescriptor, catalog: &dyn EntityCatalog) -> Self {
        let mut mapping = Self::new(&entity.name, &entity.table);
        mapping.is_abstract = entity.is_abstract;

        let lineage = catalog.lineage(&entity.name);

        // column name -> lowercased property name
        let mut columns: HashMap<String, String> = HashMap::new();
        let mut unique_columns: Vec<String> = Vec::new();

        for declaring in &lineage {
            for descriptor in &declaring.properties {
                let key = descriptor.name.to_lowercase();
                if mapping.properties.contains_key(&key) && key != "id" {
                    continue;
                }
                let mut property = PropertyMapping::new(&descriptor.name);
                property.nullable = descriptor.nullable;
                mapping.add_property(property);

                if matches!(
                    descriptor.kind,
                    PropertyKind::Scalar | PropertyKind::ManyToOne { .. }
                ) {
                    let column = descriptor.column_name().to_string();
                    if descriptor.unique {
                        unique_columns.push(column.clone());
                    }
                    columns.insert(column, key);
                }
            }
        }

        for index in lineage.iter().flat_map(|e| e.indexes.iter()) {
            if index.name.starts_with('_') {
                continue;
            }
            let Some(column) = index.columns.first() else {
                continue;
            };

            match columns.get(column).and_then(|key| mapping.properties.get_mut(key)) {
                Some(property) => {
                    property.has_normal_index = true;
                    if index.is_case_insensitive() {
                        property.case_insensitive_from_index = true;
                    }
                }
                None => tracing::warn!(
                    class = %mapping.class_name,
                    index = %index.name,
                    column = %column,
                    "Index can't resolve column to a property"
                ),
            }
        }

        for column in unique_columns {
            let class_name = mapping.class_name.clone();
            if let Some(property) = columns.get(&column).and_then(|key| mapping.properties.get_mut(key)) {
                tracing::info!(
                    class = %class_name,
                    property = %property.name,
                    "Property is unique and assumed to have an insensitive index"
                );
                if property.case_insensitive_from_index {
                    tracing::info!(
                        class = %class_name,
                        property = %property.name,
                        "Property is unique and has a redundant insensitive index declaration"
                    );
                }
                property.unique_constraint = true;
            }
        }

        mapping
    }

    /// Fold an annotation index declaration into the property facts
    ///
    /// Disagreements with schema indexes are logged, never rejected.
    pub fn apply_annotation_index(&mut self, index: &AnnotationIndex) {
        let class_name = self.class_name.clone();

        let Some(property_name) = index.property.as_deref().filter(|p| !p.is_empty()) else {
            tracing::info!(
                table = ?index.table,
                column = ?index.column,
                "Ignoring annotation index on intermediate table"
            );
            if !index.case_sensitive {
                tracing::warn!(
                    table = ?index.table,
                    column = ?index.column,
                    "Case insensitive annotation index defined on intermediate table, unable to adjust filters for case sensitivity"
                );
            }
            return;
        };

        let Some(property) = self.property_mut(property_name) else {
            tracing::warn!(
                class = %class_name,
                property = %property_name,
                "Unable to find property mapping for annotation index"
            );
            return;
        };

        if index.case_sensitive {
            if property.case_insensitive_from_index || property.unique_constraint {
                tracing::warn!(
                    class = %class_name,
                    property = %property_name,
                    "Mismatched index case sensitivity options"
                );
            }
            property.has_annotation_index = true;
        } else {
            if property.has_normal_index && !property.case_insensitive_from_index {
                tracing::warn!(
                    class = %class_name,
                    property = %property_name,
                    "Mismatched index case sensitivity options"
                );
            }
            property.has_annotation_index = true;
            property.case_insensitive_from_annotation = true;
        }
    }

    /// Whether this class has every property named by `indexes`
    ///
    /// Column-only declarations do not count against the class.
    #[must_use]
    pub fn has_index_properties(&self, indexes: &[&AnnotationIndex]) -> bool {
        for index in indexes {
            match index.property.as_deref().filter(|p| !p.is_empty()) {
                Some(name) if self.property(name).is_none() => {
                    tracing::warn!(
                        class = %self.class_name,
                        property = %name,
                        "Ignoring subclass index, missing property"
                    );
                    return false;
                }
                Some(_) => {}
                None => tracing::warn!(
                    class = %self.class_name,
                    column = ?index.column,
                    "Ignoring subclass column index"
                ),
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::catalog::{Catalog, PropertyDescriptor};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityDescriptor::new("SailPointObject", "spt_object")
                    .abstract_class()
                    .property(PropertyDescriptor::scalar("name").unique())
                    .property(PropertyDescriptor::scalar("created")),
            )
            .with_entity(
                EntityDescriptor::new("Identity", "spt_identity")
                    .extends("SailPointObject")
                    .property(PropertyDescriptor::scalar("displayName").column("display_name"))
                    .property(PropertyDescriptor::scalar("email"))
                    .property(PropertyDescriptor::scalar("lastname"))
                    .property(PropertyDescriptor::many_to_one("manager", "Identity"))
                    .index("spt_identity_dname_ci", &["display_name"])
                    .index("spt_identity_email", &["email"])
                    .index("_spt_kludge", &["lastname"])
                    .index("spt_identity_ghost", &["no_such_column"]),
            )
    }

    fn identity_mapping() -> ClassMapping {
        let catalog = catalog();
        let entity = catalog.entity("Identity").unwrap();
        ClassMapping::build(entity, &catalog)
    }

    // ============================================================================
    // Mapping Build Tests
    // ============================================================================

    #[test]
    fn test_id_property_always_present() {
        let mapping = ClassMapping::new("Empty", "spt_empty");
        assert!(mapping.property("id").is_some());
        assert!(mapping.property("ID").is_some());
    }

    #[test]
    fn test_inherited_properties_are_merged() {
        let mapping = identity_mapping();
        assert!(mapping.property("name").is_some());
        assert!(mapping.property("created").is_some());
        assert!(mapping.property("displayname").is_some());
    }

    #[test]
    fn test_ci_index_marks_property_insensitive() {
        let mapping = identity_mapping();
        let display_name = mapping.property("displayName").unwrap();
        assert!(display_name.has_normal_index);
        assert!(display_name.case_insensitive_from_index);
        assert!(display_name.is_case_insensitive());
    }

    #[test]
    fn test_plain_index_is_case_sensitive() {
        let mapping = identity_mapping();
        let email = mapping.property("email").unwrap();
        assert!(email.has_normal_index);
        assert!(!email.is_case_insensitive());
    }

    #[test]
    fn test_underscore_indexes_are_skipped() {
        let mapping = identity_mapping();
        assert!(!mapping.property("lastname").unwrap().has_normal_index);
    }

    #[test]
    fn test_unique_column_implies_insensitive() {
        let mapping = identity_mapping();
        let name = mapping.property("name").unwrap();
        assert!(name.unique_constraint);
        assert!(name.is_case_insensitive());
    }

    // ============================================================================
    // Annotation Index Tests
    // ============================================================================

    #[test]
    fn test_case_insensitive_annotation() {
        let mut mapping = identity_mapping();
        mapping.apply_annotation_index(
            &AnnotationIndex::on_property("Identity", "spt_identity_email_ci", "email")
                .case_insensitive(),
        );
        let email = mapping.property("email").unwrap();
        assert!(email.has_annotation_index);
        assert!(email.case_insensitive_from_annotation);
        assert!(email.is_case_insensitive());
    }

    #[test]
    fn test_case_sensitive_annotation_marks_index_only() {
        let mut mapping = identity_mapping();
        mapping.apply_annotation_index(&AnnotationIndex::on_property(
            "Identity",
            "spt_identity_created",
            "created",
        ));
        let created = mapping.property("created").unwrap();
        assert!(created.has_annotation_index);
        assert!(!created.is_case_insensitive());
    }

    #[test]
    fn test_column_annotation_is_ignored() {
        let mut mapping = identity_mapping();
        let before = mapping.clone();
        mapping.apply_annotation_index(
            &AnnotationIndex::on_column("Identity", "spt_cert_apps", "spt_cert_apps", "app")
                .case_insensitive(),
        );
        assert_eq!(mapping, before);
    }

    #[test]
    fn test_has_index_properties() {
        let mapping = identity_mapping();
        let present = AnnotationIndex::on_property("SailPointObject", "idx", "name");
        let missing = AnnotationIndex::on_property("SailPointObject", "idx2", "assignedScopePath");
        assert!(mapping.has_index_properties(&[&present]));
        assert!(!mapping.has_index_properties(&[&present, &missing]));
    }
}
