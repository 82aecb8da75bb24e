//! Filter tree to WHERE / HAVING fragments.
//!
//! The visitor walks a prepared filter once, writing predicates into the
//! where clause and bound values into its parameter list. Leaves whose
//! property is an aggregate (`count(links)`) go to the having clause instead.
//! Every compilation, including each nested subquery, gets its own visitor.

use super::alias::{AliasContext, JoinType};
use super::assembler::{self, SelectSpec};
use super::case_folding::{fold_value, resolve_ignore_case};
use super::like::{apply_match_mode, escape_reserved};
use super::negation;
use super::query::QueryParameters;
use crate::capabilities::DatabaseCapabilities;
use crate::errors::CompileError;
use crate::filter::{BooleanOp, CompositeFilter, Filter, FilterValue, LeafFilter, LogicalOp};
use crate::metadata::{MetadataRegistry, PropertyMapping};

pub struct PredicateVisitor<'r> {
    pub(crate) registry: &'r MetadataRegistry,
    pub(crate) capabilities: &'r dyn DatabaseCapabilities,
    pub(crate) aliases: AliasContext<'r>,
    pub(crate) where_clause: String,
    pub(crate) having_clause: String,
    having_depth: usize,
    parameters: QueryParameters,
    param_start: usize,
    auto_ignore_case: bool,
    theta_instance: usize,
    theta_collection: bool,
}

impl<'r> PredicateVisitor<'r> {
    /// Visitor for a query over `query_class` whose parameters start at `param_start`
    ///
    /// # Errors
    ///
    /// Returns `CompileError::MetadataNotFound` if the class is not registered.
    pub fn new(
        registry: &'r MetadataRegistry,
        capabilities: &'r dyn DatabaseCapabilities,
        query_class: &str,
        param_start: usize,
    ) -> Result<Self, CompileError> {
        registry.get(query_class)?;
        Ok(Self {
            registry,
            capabilities,
            aliases: AliasContext::new(registry, query_class),
            where_clause: String::new(),
            having_clause: String::new(),
            having_depth: 0,
            parameters: QueryParameters::new(),
            param_start,
            auto_ignore_case: false,
            theta_instance: 0,
            theta_collection: false,
        })
    }

    /// Fold every string comparison the metadata allows, as if each leaf asked for it
    pub fn set_auto_ignore_case(&mut self, auto_ignore_case: bool) {
        self.auto_ignore_case = auto_ignore_case;
    }

    #[must_use]
    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }

    #[must_use]
    pub fn into_parameters(self) -> QueryParameters {
        self.parameters
    }

    #[must_use]
    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    #[must_use]
    pub fn having_clause(&self) -> &str {
        &self.having_clause
    }

    /// # Errors
    ///
    /// Returns the first `CompileError` raised by any leaf.
    pub fn visit(&mut self, filter: &Filter) -> Result<(), CompileError> {
        match filter {
            Filter::Leaf(leaf) => self.visit_leaf(leaf),
            Filter::Composite(composite) => self.visit_composite(composite),
        }
    }

    // ============================================================================
    // Output targets
    // ============================================================================

    fn target(&mut self) -> &mut String {
        if self.having_depth > 0 {
            &mut self.having_clause
        } else {
            &mut self.where_clause
        }
    }

    /// Route output to the having clause while visiting an aggregate leaf
    fn switch_clause(&mut self, property: &str) -> bool {
        if !property.contains('(') {
            return false;
        }
        self.enter_having()
    }

    /// Start a new having group; separate groups are and'ed together
    fn enter_having(&mut self) -> bool {
        if self.having_depth > 0 {
            return false;
        }
        if !self.having_clause.is_empty() {
            self.having_clause.push_str(" and ");
        }
        self.having_depth += 1;
        true
    }

    fn revert_clause(&mut self, switched: bool) {
        if switched {
            self.having_depth -= 1;
        }
    }

    fn bind(&mut self, value: FilterValue) -> String {
        let name = format!("param{}", self.param_start + self.parameters.len());
        self.parameters.push(name.clone(), value);
        name
    }

    fn resolve(&mut self, path: &str, force_unique: bool) -> Result<String, CompileError> {
        self.aliases
            .substitute_alias(path, force_unique, false)?
            .ok_or_else(|| {
                CompileError::unresolvable_join(self.aliases.current_class().to_string(), path, path)
            })
    }

    // ============================================================================
    // Composites
    // ============================================================================

    /// Visit a composite in the active clause
    ///
    /// A composite made only of aggregate conditions moves to the having clause
    /// as one group. Aggregates may otherwise only be and'ed with plain
    /// conditions, since an `or` or `not` cannot be split across both clauses.
    fn visit_composite(&mut self, composite: &CompositeFilter) -> Result<(), CompileError> {
        let switched = if self.having_depth == 0 && composite.children.iter().all(is_aggregate_only) {
            !composite.children.is_empty() && self.enter_having()
        } else {
            if self.having_depth == 0
                && composite.operation != BooleanOp::And
                && composite.children.iter().any(has_aggregate)
            {
                return Err(CompileError::malformed(
                    "Conditions that use aggregates can only be and'ed with other conditions",
                ));
            }
            false
        };

        let result = self.render_composite(composite);
        self.revert_clause(switched);
        result
    }

    fn render_composite(&mut self, composite: &CompositeFilter) -> Result<(), CompileError> {
        match composite.operation {
            BooleanOp::And => self.visit_children(&composite.children, " and "),
            BooleanOp::Or => {
                let previous = self.aliases.set_inside_or(true);
                let result = self.visit_children(&composite.children, " or ");
                self.aliases.set_inside_or(previous);
                result
            }
            BooleanOp::Not => {
                let start = self.target().len();
                self.visit_children(&composite.children, " and ")?;
                if self.target().len() > start {
                    self.target().insert_str(start, "not ");
                }
                Ok(())
            }
        }
    }

    /// Visit children, joining whatever they emit and parenthesizing the group
    ///
    /// Children that emit nothing here (aggregates under a plain `and` go to
    /// the having clause) get no separator.
    fn visit_children(&mut self, children: &[Filter], conjunct: &str) -> Result<(), CompileError> {
        let start = self.target().len();
        let mut separator = "";

        for child in children {
            let mark = self.target().len();
            self.visit(child)?;
            if self.target().len() > mark {
                self.target().insert_str(mark, separator);
                separator = conjunct;
            }
        }

        if self.target().len() > start {
            self.target().insert(start, '(');
            self.target().push(')');
        }
        Ok(())
    }

    // ============================================================================
    // Leaves
    // ============================================================================

    fn visit_leaf(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        match leaf.operation {
            LogicalOp::Eq => self.equality(leaf, &leaf.value, "=", false),
            LogicalOp::Ne => self.equality(leaf, &leaf.value, "!=", false),
            LogicalOp::Lt
            | LogicalOp::Gt
            | LogicalOp::Le
            | LogicalOp::Ge
            | LogicalOp::Like => {
                let operator = leaf.operation.operator().unwrap_or("=");
                self.comparison(leaf, &leaf.value, operator, false)
            }
            LogicalOp::In => self.visit_in(leaf),
            LogicalOp::IsNull => self.null_check(leaf, "is null"),
            LogicalOp::NotNull => self.null_check(leaf, "is not null"),
            LogicalOp::IsEmpty => self.visit_is_empty(leaf),
            LogicalOp::ContainsAll => self.visit_contains_all(leaf),
            LogicalOp::Join => self.visit_join(leaf),
            LogicalOp::LeftJoin => self.visit_left_join(leaf),
            LogicalOp::CollectionCondition => self.visit_collection_condition(leaf),
            LogicalOp::Subquery => self.visit_subquery(leaf),
        }
    }

    /// `=` / `!=`, turning a null operand into a null check
    fn equality(
        &mut self,
        leaf: &LeafFilter,
        value: &FilterValue,
        operator: &str,
        force_unique: bool,
    ) -> Result<(), CompileError> {
        if value.is_null() {
            let check = if operator == "=" { "is null" } else { "is not null" };
            return self.null_check(leaf, check);
        }
        self.comparison(leaf, value, operator, force_unique)
    }

    fn comparison(
        &mut self,
        leaf: &LeafFilter,
        value: &FilterValue,
        operator: &str,
        force_unique: bool,
    ) -> Result<(), CompileError> {
        let switched = self.switch_clause(&leaf.property);
        let result = self.render_comparison(leaf, value, operator, force_unique);
        self.revert_clause(switched);
        result
    }

    fn render_comparison(
        &mut self,
        leaf: &LeafFilter,
        value: &FilterValue,
        operator: &str,
        force_unique: bool,
    ) -> Result<(), CompileError> {
        let ignore_case = self.ignore_case(leaf, value);
        let reference = cased(self.resolve(&leaf.property, force_unique)?, ignore_case);
        let (value, escape) = self.process_value(leaf, value, ignore_case);
        let param = self.bind(value);

        let mut rendered = match &leaf.cast {
            Some(db_type) => format!("cast({reference} as {db_type}) {operator} :{param}"),
            None => format!("{reference} {operator} :{param}"),
        };
        if let Some(escape) = escape {
            rendered.push_str(&format!(" escape '{escape}'"));
        }
        self.target().push_str(&rendered);
        Ok(())
    }

    /// Fold, escape and wildcard a comparison value, in that order
    fn process_value(
        &self,
        leaf: &LeafFilter,
        value: &FilterValue,
        ignore_case: bool,
    ) -> (FilterValue, Option<char>) {
        let value = if ignore_case { fold_value(value) } else { value.clone() };

        match (leaf.operation, value) {
            (LogicalOp::Like, FilterValue::String(pattern)) => {
                let (escaped, escape) =
                    escape_reserved(&pattern, self.capabilities.reserved_query_strings());
                let pattern = apply_match_mode(&escaped, leaf.match_mode);
                (FilterValue::String(pattern), escape)
            }
            (_, value) => (value, None),
        }
    }

    fn ignore_case(&self, leaf: &LeafFilter, value: &FilterValue) -> bool {
        let requested = leaf.ignore_case || self.auto_ignore_case;
        let (class, mapping) = self.property_mapping(&leaf.property);
        resolve_ignore_case(
            self.capabilities,
            &class,
            &leaf.property,
            mapping,
            value,
            requested,
        )
    }

    /// Metadata for a plain or `Class.property` reference; dotted paths have none
    fn property_mapping(&self, property: &str) -> (String, Option<&'r PropertyMapping>) {
        let registry = self.registry;
        match property.split_once('.') {
            None => {
                let class = self.aliases.current_class().to_string();
                let mapping = registry.find(&class).and_then(|m| m.property(property));
                (class, mapping)
            }
            Some((class, rest))
                if !rest.contains('.')
                    && class.starts_with(char::is_uppercase)
                    && registry.is_known_class(class) =>
            {
                let mapping = registry.find(class).and_then(|m| m.property(rest));
                (class.to_string(), mapping)
            }
            Some(_) => (self.aliases.current_class().to_string(), None),
        }
    }

    fn null_check(&mut self, leaf: &LeafFilter, check: &str) -> Result<(), CompileError> {
        let switched = self.switch_clause(&leaf.property);
        let result = self.resolve(&leaf.property, false).map(|reference| {
            self.target().push_str(&format!("{reference} {check}"));
        });
        self.revert_clause(switched);
        result
    }

    fn visit_is_empty(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let switched = self.switch_clause(&leaf.property);
        let result = self
            .aliases
            .collection_reference(&leaf.property)
            .and_then(|reference| {
                reference.ok_or_else(|| {
                    CompileError::unresolvable_join(
                        self.aliases.current_class().to_string(),
                        &leaf.property,
                        &leaf.property,
                    )
                })
            })
            .map(|reference| self.target().push_str(&format!("size({reference}) = 0")));
        self.revert_clause(switched);
        result
    }

    fn visit_in(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let values = leaf.value.elements();

        if leaf.value.has_entities() {
            let equalities: Vec<Filter> = values
                .iter()
                .map(|value| Filter::Leaf(leaf.with_operation(LogicalOp::Eq, value.clone())))
                .collect();
            return match equalities.as_slice() {
                [single] => self.visit(single),
                _ => self.visit_composite(&CompositeFilter::new(BooleanOp::Or, equalities)),
            };
        }

        let switched = self.switch_clause(&leaf.property);
        let result = self.render_scalar_in(leaf, values);
        self.revert_clause(switched);
        result
    }

    fn render_scalar_in(&mut self, leaf: &LeafFilter, values: &[FilterValue]) -> Result<(), CompileError> {
        if values.is_empty() {
            self.target().push_str("1 = 0");
            return Ok(());
        }

        let ignore_case = self.ignore_case(leaf, &leaf.value);
        // one joined row must not satisfy several list values of a scalar collection
        let unique = self.aliases.is_scalar_collection(&leaf.property);
        let reference = cased(self.resolve(&leaf.property, unique)?, ignore_case);

        let params: Vec<String> = values
            .iter()
            .map(|value| {
                let (value, _) = self.process_value(leaf, value, ignore_case);
                format!(":{}", self.bind(value))
            })
            .collect();

        self.target()
            .push_str(&format!("{reference} in ({})", params.join(", ")));
        Ok(())
    }

    fn visit_contains_all(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let values = leaf.value.elements();

        if values.len() > 1
            && self.aliases.in_collection_scope()
            && !self.aliases.describe(&leaf.property).crosses_collection
        {
            return Err(CompileError::unsupported_contains_all(
                &leaf.property,
                values.len(),
            ));
        }

        if let [value] = values {
            return self.equality(leaf, value, "=", false);
        }

        let switched = self.switch_clause(&leaf.property);
        let result = self.render_contains_all(leaf, values);
        self.revert_clause(switched);
        result
    }

    /// One equality per value, each through its own join
    fn render_contains_all(&mut self, leaf: &LeafFilter, values: &[FilterValue]) -> Result<(), CompileError> {
        for (position, value) in values.iter().enumerate() {
            if position > 0 {
                self.target().push_str(" and ");
            }
            self.render_comparison(leaf, value, "=", true)?;
        }
        Ok(())
    }

    // ============================================================================
    // Joins
    // ============================================================================

    /// Class named by the first segment of a `Class.property` join property
    fn join_class(&self, join_property: &str) -> Result<String, CompileError> {
        let class = join_property.split('.').next().unwrap_or(join_property);
        if self.registry.is_known_class(class) {
            Ok(class.to_string())
        } else {
            Err(CompileError::unresolvable_join(
                self.aliases.query_class().to_string(),
                class,
                join_property,
            ))
        }
    }

    fn join_property<'f>(leaf: &'f LeafFilter) -> Result<&'f str, CompileError> {
        leaf.join_property.as_deref().ok_or_else(|| {
            CompileError::malformed(format!("Join on {} has no join property", leaf.property))
        })
    }

    /// `left = right`, or `right in elements(left)` for a scalar collection
    fn join_condition(&mut self, leaf: &LeafFilter, join_property: &str) -> Result<String, CompileError> {
        let right = self.resolve(join_property, false)?;
        if self.aliases.is_scalar_collection(&leaf.property) {
            let left = self
                .aliases
                .collection_reference(&leaf.property)?
                .ok_or_else(|| {
                    CompileError::unresolvable_join(
                        self.aliases.current_class().to_string(),
                        &leaf.property,
                        &leaf.property,
                    )
                })?;
            return Ok(format!("{right} in elements({left})"));
        }
        let left = self.resolve(&leaf.property, false)?;
        Ok(format!("{left} = {right}"))
    }

    fn visit_join(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let join_property = Self::join_property(leaf)?;
        let class = self.join_class(join_property)?;

        if !self.theta_collection {
            self.aliases.add_from(&class);
            let condition = self.join_condition(leaf, join_property)?;
            self.target().push_str(&condition);
            return Ok(());
        }

        // the same class may be correlated more than once in one query
        self.aliases.add_theta_from(&class, self.theta_instance);
        self.theta_instance += 1;

        let left = self.aliases.substitute_alias_with_ancestors(&leaf.property)?;
        let right = self.resolve(join_property, false)?;
        self.target().push_str(&format!("{left} = {right}"));
        Ok(())
    }

    fn visit_left_join(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let join_property = Self::join_property(leaf)?;
        let class = self.join_class(join_property)?;

        let alias = match self.aliases.class_alias(&class) {
            Some(alias) => alias.to_string(),
            None => self.aliases.set_class_alias(&class, None),
        };
        let condition = self.join_condition(leaf, join_property)?;
        let property = join_property
            .split_once('.')
            .map_or(join_property, |(_, rest)| rest);

        self.aliases.add_on_join(&class, property, &alias, condition);
        Ok(())
    }

    // ============================================================================
    // Collection conditions and subqueries
    // ============================================================================

    fn visit_collection_condition(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let condition = leaf.collection_condition.as_deref().ok_or_else(|| {
            CompileError::malformed(format!(
                "Collection condition on {} has no condition",
                leaf.property
            ))
        })?;

        // `IdentityExternalAttribute` rather than `links`: an unmapped relation
        let theta = !leaf.property.contains('.') && leaf.property.starts_with(char::is_uppercase);
        let previous = std::mem::replace(&mut self.theta_collection, theta);
        let result = self.render_collection_condition(&leaf.property, condition, theta);
        self.theta_collection = previous;
        result
    }

    fn render_collection_condition(
        &mut self,
        property: &str,
        condition: &CompositeFilter,
        theta: bool,
    ) -> Result<(), CompileError> {
        // owners without elements still satisfy the other branch of an `or`
        let outer = condition.operation == BooleanOp::Or && condition.children.len() > 1;
        let (plain, negated) = negation::split(condition);
        let start = self.target().len();

        if let Some(plain) = &plain {
            self.visit_in_scope(property, plain, theta, outer)?;
        }

        if let Some(negated) = negated {
            let combined = self.target().len() > start;
            if combined {
                let conjunct = match condition.operation {
                    BooleanOp::Or => " or ",
                    BooleanOp::And | BooleanOp::Not => " and ",
                };
                self.target().push_str(conjunct);
            }
            self.not_in_subquery(property, negated)?;
            if combined {
                self.target().insert(start, '(');
                self.target().push(')');
            }
        }
        Ok(())
    }

    /// Visit `condition` with paths resolving against the collection's element
    fn visit_in_scope(
        &mut self,
        property: &str,
        condition: &CompositeFilter,
        theta: bool,
        outer: bool,
    ) -> Result<(), CompileError> {
        if theta {
            if !self.registry.is_known_class(property) {
                return Err(CompileError::unresolvable_join(
                    self.aliases.query_class().to_string(),
                    property,
                    property,
                ));
            }
            self.aliases.push_theta_scope();
        } else {
            let join_type = if outer || self.aliases.is_inside_or() {
                JoinType::LeftOuter
            } else {
                JoinType::Inner
            };
            self.aliases.push_collection_scope(property, join_type)?;
        }

        let result = self.visit_composite(condition);
        self.aliases.pop_scope();
        result
    }

    /// `owner not in (select inverse from Element where positive)`
    fn not_in_subquery(&mut self, property: &str, positive: CompositeFilter) -> Result<(), CompileError> {
        let owner = self.aliases.current_class().to_string();
        let prefix = format!("{}.", self.aliases.query_class());
        let collection = property.strip_prefix(&prefix).unwrap_or(property);

        let inverse = self
            .registry
            .inverse_property(&owner, collection)
            .ok_or_else(|| CompileError::missing_back_reference(&owner, collection))?;
        let element = self
            .registry
            .property(&owner, collection)
            .and_then(|p| p.kind.target())
            .map(str::to_string)
            .ok_or_else(|| CompileError::missing_back_reference(&owner, collection))?;

        let alias = self
            .aliases
            .default_alias()
            .map(str::to_string)
            .ok_or_else(|| CompileError::unresolvable_join(&owner, collection, property))?;

        self.subquery_condition(
            &alias,
            "not in",
            &element,
            &inverse,
            Some(&Filter::Composite(positive)),
        )
    }

    fn visit_subquery(&mut self, leaf: &LeafFilter) -> Result<(), CompileError> {
        let (Some(class), Some(select)) = (&leaf.subquery_class, &leaf.subquery_property) else {
            return Err(CompileError::malformed(format!(
                "Subquery on {} needs a class and a property",
                leaf.property
            )));
        };

        let switched = self.switch_clause(&leaf.property);
        let result = self.resolve(&leaf.property, false).and_then(|reference| {
            self.subquery_condition(&reference, "in", class, select, leaf.subquery_filter.as_deref())
        });
        self.revert_clause(switched);
        result
    }

    /// Compile a nested select and append `reference operator (select ...)`
    ///
    /// The nested visitor numbers its parameters after ours so names never collide.
    fn subquery_condition(
        &mut self,
        reference: &str,
        operator: &str,
        class: &str,
        select: &str,
        filter: Option<&Filter>,
    ) -> Result<(), CompileError> {
        let start = self.param_start + self.parameters.len();
        let mut nested = PredicateVisitor::new(self.registry, self.capabilities, class, start)?;
        if let Some(filter) = filter {
            nested.visit(filter)?;
        }

        let columns = [select.to_string()];
        let spec = SelectSpec {
            columns: &columns,
            ..SelectSpec::default()
        };
        let assembled = assembler::assemble_select(&mut nested, &spec)?;

        self.parameters.extend(nested.into_parameters());
        self.target()
            .push_str(&format!("{reference} {operator} ({})", assembled.text));
        Ok(())
    }
}

/// Whether every leaf under `filter` compares an aggregate such as `count(links)`
fn is_aggregate_only(filter: &Filter) -> bool {
    match filter {
        Filter::Leaf(leaf) => leaf.property.contains('('),
        Filter::Composite(composite) => {
            !composite.children.is_empty() && composite.children.iter().all(is_aggregate_only)
        }
    }
}

fn has_aggregate(filter: &Filter) -> bool {
    match filter {
        Filter::Leaf(leaf) => leaf.property.contains('('),
        Filter::Composite(composite) => composite.children.iter().any(has_aggregate),
    }
}

fn cased(reference: String, ignore_case: bool) -> String {
    if ignore_case {
        format!("upper({reference})")
    } else {
        reference
    }
}
