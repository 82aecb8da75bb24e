use crate::filter::FilterValue;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Bound parameters in binding order
///
/// Names are `param0`, `param1`, ... continuing across nested subqueries, so
/// the order here is also the numeric order of the names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    entries: Vec<(String, FilterValue)>,
}

impl QueryParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: String, value: FilterValue) {
        self.entries.push((name, value));
    }

    pub(crate) fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values ready to bind through SeaORM, in binding order
    #[must_use]
    pub fn to_values(&self) -> Vec<sea_orm::Value> {
        self.entries.iter().map(|(_, v)| v.to_sea_value()).collect()
    }
}

impl Serialize for QueryParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Query text with its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub text: String,
    pub parameters: QueryParameters,
    /// Distinct was requested but the store cannot express it for this
    /// projection; callers must de-duplicate results by entity identity
    pub requires_distinct_filter: bool,
    pub spans_multiple_tables: bool,
}
