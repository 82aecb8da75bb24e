use crate::filter::Filter;
use serde::{Deserialize, Serialize};

// Shared default values
const DEFAULT_SORT_COLUMN: &str = "id";
const DEFAULT_SORT_ORDER: &str = "ASC";

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ordering {
    pub property: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    /// Sort on `upper(property)`; ignored when the store is case-insensitive
    #[serde(default)]
    pub ignore_case: bool,
}

fn default_ascending() -> bool {
    true
}

impl Ordering {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
            ignore_case: false,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
            ignore_case: false,
        }
    }

    #[must_use]
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Parse the React Admin sort format `["column","DESC"]`
    ///
    /// Malformed input falls back to sorting by `id` ascending.
    #[must_use]
    pub fn from_json_sort(json: &str) -> Self {
        let sort_vec: Vec<String> = serde_json::from_str(json).unwrap_or_default();
        let property = sort_vec
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_SORT_COLUMN.to_string());
        let order = sort_vec
            .get(1)
            .map_or(DEFAULT_SORT_ORDER, String::as_str);

        Self {
            property,
            ascending: order.eq_ignore_ascii_case("ASC"),
            ignore_case: false,
        }
    }
}

/// Everything besides the target class that shapes a compiled query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// AND-combined restrictions
    pub restrictions: Vec<Filter>,
    pub distinct: bool,
    /// Treat every leaf as if it requested ignore case
    pub ignore_case: bool,
    /// Projection; empty selects whole entities
    pub columns: Vec<String>,
    pub orderings: Vec<Ordering>,
    pub group_by: Vec<String>,
    pub disable_optimizer: bool,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add(mut self, filter: Filter) -> Self {
        self.restrictions.push(filter);
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = properties.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn disable_optimizer(mut self) -> Self {
        self.disable_optimizer = true;
        self
    }
}
