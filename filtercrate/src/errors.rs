//! # Compile Errors
//!
//! Every failure the compiler can report is deterministic and happens before a
//! query ever reaches the database, so nothing here is retried.
//!
//! Errors fall into two groups:
//! - **Caller errors** (bad filter trees): unresolvable property paths, multi-value
//!   `CONTAINS_ALL` against a single joined row, malformed aggregate usage.
//! - **Deployment errors** (bad catalogs): a class with no registered metadata,
//!   a collection without a registered back reference.
//!
//! Both groups log through `tracing` and can be returned straight from an Axum
//! handler. Deployment errors are sanitized before being sent to clients.
//!
//! ```rust,ignore
//! use filtercrate::{CompileError, CompiledQuery, QueryCompiler, QueryOptions};
//!
//! async fn search(
//!     State(compiler): State<QueryCompiler>,
//!     Json(options): Json<QueryOptions>,
//! ) -> Result<Json<CompiledQuery>, CompileError> {
//!     Ok(Json(compiler.compile("Identity", &options)?))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Errors raised while compiling a filter into a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The class has no entry in the metadata registry
    MetadataNotFound {
        /// Simple class name that was requested
        class: String,
    },

    /// A segment of a dotted property path is not a known association
    UnresolvableJoin {
        /// Class the segment was looked up on
        class: String,
        /// Segment that failed to resolve
        segment: String,
        /// Full path as supplied by the caller
        path: String,
    },

    /// `CONTAINS_ALL` with several values against a property that can only
    /// match one joined row
    UnsupportedMultiValueContainsAll {
        /// Property the filter tested
        property: String,
        /// Number of values supplied
        values: usize,
    },

    /// A negated collection condition needs an inverse property that is not registered
    MissingBackReference {
        /// Class owning the collection
        class: String,
        /// Collection property name
        collection: String,
    },

    /// Structurally invalid query, e.g. aggregate conditions without a group by
    MalformedQuery {
        /// Description of the problem
        message: String,
    },
}

impl CompileError {
    // ============================================================================
    // Constructors
    // ============================================================================

    pub fn metadata_not_found(class: impl Into<String>) -> Self {
        Self::MetadataNotFound {
            class: class.into(),
        }
    }

    pub fn unresolvable_join(
        class: impl Into<String>,
        segment: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::UnresolvableJoin {
            class: class.into(),
            segment: segment.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn unsupported_contains_all(property: impl Into<String>, values: usize) -> Self {
        Self::UnsupportedMultiValueContainsAll {
            property: property.into(),
            values,
        }
    }

    pub fn missing_back_reference(class: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::MissingBackReference {
            class: class.into(),
            collection: collection.into(),
        }
    }

    /// Create a malformed query error
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(CompileError::malformed("A 'group by' is required for conditions that use aggregates"));
    /// ```
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedQuery {
            message: message.into(),
        }
    }

    // ============================================================================
    // Classification
    // ============================================================================

    /// Whether the caller can fix this error by changing the filter
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableJoin { .. }
                | Self::UnsupportedMultiValueContainsAll { .. }
                | Self::MalformedQuery { .. }
        )
    }

    fn status_code(&self) -> StatusCode {
        if self.is_caller_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Message safe to hand back to API clients
    fn user_message(&self) -> String {
        match self {
            Self::MetadataNotFound { .. } | Self::MissingBackReference { .. } => {
                "The query could not be compiled".to_string()
            }
            _ => self.to_string(),
        }
    }

    fn log_internal(&self) {
        if self.is_caller_error() {
            tracing::debug!(error = %self, "Filter rejected");
        } else {
            tracing::error!(error = %self, "Query compiler is misconfigured");
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataNotFound { class } => {
                write!(f, "Unable to find class mapping for {class}")
            }
            Self::UnresolvableJoin {
                class,
                segment,
                path,
            } => write!(
                f,
                "Could not resolve '{segment}' on {class} while joining path '{path}'"
            ),
            Self::UnsupportedMultiValueContainsAll { property, values } => write!(
                f,
                "containsAll on '{property}' with {values} values can never match a single joined element"
            ),
            Self::MissingBackReference { class, collection } => write!(
                f,
                "Cannot negate a condition on {class}.{collection}: the collection element has no bi-directional association with its owner"
            ),
            Self::MalformedQuery { message } => write!(f, "Invalid query: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for CompileError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let response = ErrorResponse {
            error: self.user_message(),
        };

        (status, Json(response)).into_response()
    }
}
