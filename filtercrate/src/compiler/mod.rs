// Feature Group 3: Query Compiler
// Alias resolution, predicate visiting, filter rewrites and query assembly

pub mod alias;
pub mod assembler;
pub mod case_folding;
pub mod like;
pub mod negation;
pub mod optimizer;
pub mod options;
pub mod query;
pub mod visitor;

pub use alias::{AliasContext, FromEntry, Join, JoinType};
pub use options::{Ordering, QueryOptions};
pub use query::{CompiledQuery, QueryParameters};
pub use visitor::PredicateVisitor;

use crate::capabilities::DatabaseCapabilities;
use crate::errors::CompileError;
use crate::filter::Filter;
use crate::metadata::{MetadataRegistry, registry};
use assembler::SelectSpec;
use std::sync::Arc;

/// Compiles filters against one registry and one store's capabilities
///
/// Cheap to clone and safe to share; every compilation builds its own
/// visitor and alias context.
#[derive(Clone)]
pub struct QueryCompiler {
    registry: Arc<MetadataRegistry>,
    capabilities: Arc<dyn DatabaseCapabilities>,
}

impl QueryCompiler {
    pub fn new(
        registry: Arc<MetadataRegistry>,
        capabilities: impl DatabaseCapabilities + 'static,
    ) -> Self {
        Self {
            registry,
            capabilities: Arc::new(capabilities),
        }
    }

    /// Compiler over the process-wide registry, if one has been installed
    pub fn from_global(capabilities: impl DatabaseCapabilities + 'static) -> Option<Self> {
        registry::global().map(|registry| Self::new(registry, capabilities))
    }

    #[must_use]
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    #[must_use]
    pub fn capabilities(&self) -> &dyn DatabaseCapabilities {
        self.capabilities.as_ref()
    }

    /// Compile a select over `class`
    ///
    /// # Errors
    ///
    /// Returns `CompileError` if the class is unknown, a path cannot be
    /// joined, or the options describe an impossible query.
    pub fn compile(&self, class: &str, options: &QueryOptions) -> Result<CompiledQuery, CompileError> {
        let mut visitor = self.visit(class, options)?;
        let spec = SelectSpec {
            columns: &options.columns,
            distinct: options.distinct,
            orderings: &options.orderings,
            group_by: &options.group_by,
        };
        let assembled = assembler::assemble_select(&mut visitor, &spec)?;
        Ok(Self::finish(assembled, visitor))
    }

    /// Compile a plain entity select restricted by `filter`
    ///
    /// # Errors
    ///
    /// See [`QueryCompiler::compile`].
    pub fn compile_filter(&self, class: &str, filter: &Filter) -> Result<CompiledQuery, CompileError> {
        self.compile(class, &QueryOptions::new().add(filter.clone()))
    }

    /// Compile a bulk delete of the `class` rows the restrictions match
    ///
    /// Projection, ordering and grouping options are ignored.
    ///
    /// # Errors
    ///
    /// See [`QueryCompiler::compile`].
    pub fn compile_delete(&self, class: &str, options: &QueryOptions) -> Result<CompiledQuery, CompileError> {
        let visitor = self.visit(class, options)?;
        let assembled = assembler::assemble_delete(&visitor)?;
        Ok(Self::finish(assembled, visitor))
    }

    fn visit(&self, class: &str, options: &QueryOptions) -> Result<PredicateVisitor<'_>, CompileError> {
        let mut visitor =
            PredicateVisitor::new(&self.registry, self.capabilities.as_ref(), class, 0)?;
        visitor.set_auto_ignore_case(options.ignore_case);
        if let Some(filter) = prepare(options) {
            visitor.visit(&filter)?;
        }
        Ok(visitor)
    }

    fn finish(assembled: assembler::Assembled, visitor: PredicateVisitor<'_>) -> CompiledQuery {
        let compiled = CompiledQuery {
            text: assembled.text,
            parameters: visitor.into_parameters(),
            requires_distinct_filter: assembled.requires_distinct_filter,
            spans_multiple_tables: assembled.spans_multiple_tables,
        };
        tracing::debug!(
            query = %compiled.text,
            parameters = ?compiled.parameters,
            "Compiled query"
        );
        compiled
    }
}

/// AND the restrictions together and apply the pre-compilation rewrites
fn prepare(options: &QueryOptions) -> Option<Filter> {
    let combined = match options.restrictions.as_slice() {
        [] => return None,
        [only] => only.clone(),
        restrictions => Filter::and(restrictions.to_vec()),
    };

    let rewritten = optimizer::reorder_collection_conditions(&negation::fold_double_negation(&combined));
    if options.disable_optimizer {
        return Some(rewritten);
    }

    tracing::debug!(filter = ?rewritten, "Filter before optimization");
    let optimized = optimizer::optimize(&rewritten);
    tracing::debug!(filter = ?optimized, "Filter after optimization");
    Some(optimized)
}
