use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a persisted entity used as a filter operand
///
/// Comparing an association against an entity compares identities, so only
/// the class and id are carried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub class: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(class: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: id.into(),
        }
    }
}

/// Operand of a leaf filter
///
/// Deserialization is untagged; variant order decides how ambiguous JSON is read,
/// so UUID and RFC 3339 strings become typed values rather than plain strings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    String(String),
    Entity(EntityRef),
    List(Vec<FilterValue>),
}

impl FilterValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }

    /// Elements of a list value, or the value itself as a one-element slice
    #[must_use]
    pub fn elements(&self) -> &[FilterValue] {
        match self {
            Self::List(values) => values,
            other => std::slice::from_ref(other),
        }
    }

    /// Whether this value, or any element of it, references an entity
    #[must_use]
    pub fn has_entities(&self) -> bool {
        self.elements().iter().any(Self::is_entity)
    }

    /// Convert into a value SeaORM can bind to a statement
    ///
    /// Entity references bind as their id, lists as JSON arrays.
    #[must_use]
    pub fn to_sea_value(&self) -> sea_orm::Value {
        match self {
            Self::Null => sea_orm::Value::String(None),
            Self::Bool(b) => sea_orm::Value::from(*b),
            Self::Int(i) => sea_orm::Value::from(*i),
            Self::Float(f) => sea_orm::Value::from(*f),
            Self::Uuid(u) => sea_orm::Value::from(*u),
            Self::DateTime(dt) => sea_orm::Value::from(*dt),
            Self::String(s) => sea_orm::Value::from(s.clone()),
            Self::Entity(entity) => sea_orm::Value::from(entity.id.clone()),
            Self::List(values) => sea_orm::Value::from(serde_json::Value::Array(
                values
                    .iter()
                    .map(|v| serde_json::to_value(v).unwrap_or(serde_json::Value::Null))
                    .collect(),
            )),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<EntityRef> for FilterValue {
    fn from(value: EntityRef) -> Self {
        Self::Entity(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
