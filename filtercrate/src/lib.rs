//! Compile caller-built filter trees into parameterized object queries.
//!
//! A [`Filter`] names properties by dotted paths (`links.application.name`);
//! the [`QueryCompiler`] turns it into query text with every path joined and
//! aliased, values bound as `:paramN`, and string comparisons folded to upper
//! case only where the registered indexes can serve them.
//!
//! ```rust,ignore
//! use filtercrate::{BackendCapabilities, Filter, QueryCompiler, QueryOptions};
//!
//! let compiler = QueryCompiler::new(registry, BackendCapabilities::new(DatabaseBackend::Postgres));
//! let compiled = compiler.compile(
//!     "Identity",
//!     &QueryOptions::new().add(Filter::collection_condition(
//!         "links",
//!         Filter::eq("application.name", "AD"),
//!     )),
//! )?;
//! ```

pub mod capabilities;
pub mod compiler;
pub mod errors;
pub mod filter;
pub mod metadata;

pub use capabilities::{BackendCapabilities, DatabaseCapabilities};
pub use compiler::{CompiledQuery, Ordering, QueryCompiler, QueryOptions, QueryParameters};
pub use errors::CompileError;
pub use filter::{BooleanOp, CompositeFilter, EntityRef, Filter, FilterValue, LeafFilter, LogicalOp, MatchMode};
pub use metadata::{Catalog, EntityDescriptor, MetadataRegistry, PropertyDescriptor};
