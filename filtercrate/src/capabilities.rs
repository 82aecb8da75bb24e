//! What the target store can and cannot express.
//!
//! The compiler asks these questions instead of hard-coding per-backend rules,
//! so the same filter compiles differently for a case-insensitive MySQL
//! collation than for Postgres.

use sea_orm::DatabaseBackend;
use std::collections::HashSet;

/// Capability descriptor consulted while compiling
pub trait DatabaseCapabilities: Send + Sync {
    /// Whether string comparisons are already case-insensitive everywhere
    fn is_case_insensitive(&self) -> bool;

    /// Strings with special meaning inside LIKE patterns
    fn reserved_query_strings(&self) -> &[String];

    /// Whether `select distinct` can be used with this projection
    ///
    /// An empty projection selects whole entities.
    fn can_use_distinct(&self, columns: &[String]) -> bool;
}

/// Capabilities derived from a SeaORM backend, with per-deployment overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCapabilities {
    backend: DatabaseBackend,
    case_insensitive: bool,
    reserved: Vec<String>,
    non_distinct_properties: HashSet<String>,
    entity_distinct: bool,
}

impl BackendCapabilities {
    #[must_use]
    pub fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            // MySQL's default collations compare case-insensitively
            case_insensitive: matches!(backend, DatabaseBackend::MySql),
            reserved: vec!["%".to_string(), "_".to_string()],
            non_distinct_properties: HashSet::new(),
            entity_distinct: true,
        }
    }

    #[must_use]
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    #[must_use]
    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    #[must_use]
    pub fn reserved<I, S>(mut self, reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved = reserved.into_iter().map(Into::into).collect();
        self
    }

    /// Mark a property whose column type cannot take part in `select distinct`
    /// (large text or blob columns on most stores)
    #[must_use]
    pub fn with_non_distinct_property(mut self, property: impl Into<String>) -> Self {
        self.non_distinct_properties.insert(property.into());
        self
    }

    /// Entities with non-distinct columns cannot be selected with `distinct`
    #[must_use]
    pub fn without_entity_distinct(mut self) -> Self {
        self.entity_distinct = false;
        self
    }
}

impl From<DatabaseBackend> for BackendCapabilities {
    fn from(backend: DatabaseBackend) -> Self {
        Self::new(backend)
    }
}

impl DatabaseCapabilities for BackendCapabilities {
    fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn reserved_query_strings(&self) -> &[String] {
        &self.reserved
    }

    fn can_use_distinct(&self, columns: &[String]) -> bool {
        if columns.is_empty() {
            return self.entity_distinct;
        }
        columns.iter().all(|column| {
            let property = column.rsplit('.').next().unwrap_or(column);
            !self.non_distinct_properties.contains(property)
        })
    }
}
