//! Final query text from a visited filter.
//!
//! The visitor leaves predicates, joins and FROM entries behind; assembly
//! resolves the projection, grouping and ordering against the same alias
//! context (which may add outer joins) and renders the FROM clause last.

use super::alias::AliasContext;
use super::options::Ordering;
use super::visitor::PredicateVisitor;
use crate::errors::CompileError;

/// Shape of a select statement besides its predicates
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectSpec<'a> {
    /// Projection; empty selects the query class entity
    pub columns: &'a [String],
    pub distinct: bool,
    pub orderings: &'a [Ordering],
    pub group_by: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub text: String,
    pub requires_distinct_filter: bool,
    pub spans_multiple_tables: bool,
}

/// Render `select ... from ... where ... group by ... having ... order by ...`
///
/// # Errors
///
/// Returns `CompileError::MalformedQuery` when the having clause has content
/// but nothing is grouped, or when there is nothing to select from.
pub fn assemble_select(
    visitor: &mut PredicateVisitor<'_>,
    spec: &SelectSpec<'_>,
) -> Result<Assembled, CompileError> {
    if !visitor.having_clause.is_empty() && spec.group_by.is_empty() {
        return Err(CompileError::malformed(
            "A 'group by' is required for conditions that use aggregates",
        ));
    }

    // rows with a null association must not drop out because of the ordering
    let mut order_by = Vec::with_capacity(spec.orderings.len());
    for ordering in spec.orderings {
        let reference = resolve(&mut visitor.aliases, &ordering.property, true)?;
        let reference = if ordering.ignore_case && !visitor.capabilities.is_case_insensitive() {
            format!("upper({reference})")
        } else {
            reference
        };
        order_by.push(if ordering.ascending {
            reference
        } else {
            format!("{reference} desc")
        });
    }

    let columns = projection(spec);
    let distinct = spec.distinct && visitor.capabilities.can_use_distinct(&columns);
    let select = select_list(&mut visitor.aliases, &columns, distinct)?;

    let group_by = spec
        .group_by
        .iter()
        .map(|property| resolve(&mut visitor.aliases, property, false))
        .collect::<Result<Vec<_>, _>>()?;

    let mut text = String::from("select ");
    if distinct {
        text.push_str("distinct ");
    }
    text.push_str(&select);
    text.push_str(" from ");
    text.push_str(&from_clause(&visitor.aliases)?);

    if !visitor.where_clause.is_empty() {
        text.push_str(" where ");
        text.push_str(&visitor.where_clause);
    }
    if !group_by.is_empty() {
        text.push_str(" group by ");
        text.push_str(&group_by.join(", "));
        if !visitor.having_clause.is_empty() {
            text.push_str(" having ");
            text.push_str(&visitor.having_clause);
        }
    }
    if !order_by.is_empty() {
        text.push_str(" order by ");
        text.push_str(&order_by.join(", "));
    }

    Ok(Assembled {
        text,
        requires_distinct_filter: spec.distinct && !distinct,
        spans_multiple_tables: spans_multiple_tables(&visitor.aliases),
    })
}

/// Render `delete from ... where ...`
///
/// # Errors
///
/// Returns `CompileError::MalformedQuery` when the filter used aggregates,
/// which a delete cannot group by.
pub fn assemble_delete(visitor: &PredicateVisitor<'_>) -> Result<Assembled, CompileError> {
    if !visitor.having_clause.is_empty() {
        return Err(CompileError::malformed(
            "A 'group by' is required for conditions that use aggregates",
        ));
    }

    let mut text = format!("delete from {}", from_clause(&visitor.aliases)?);
    if !visitor.where_clause.is_empty() {
        text.push_str(" where ");
        text.push_str(&visitor.where_clause);
    }

    Ok(Assembled {
        text,
        requires_distinct_filter: false,
        spans_multiple_tables: spans_multiple_tables(&visitor.aliases),
    })
}

/// Projection with ordering columns appended, as distinct requires
fn projection(spec: &SelectSpec<'_>) -> Vec<String> {
    let mut columns = spec.columns.to_vec();
    if !spec.distinct || columns.is_empty() {
        return columns;
    }
    if let [only] = columns.as_slice() {
        if count_distinct_property(only).is_some() {
            return columns;
        }
    }
    for ordering in spec.orderings {
        if !columns.contains(&ordering.property) {
            columns.push(ordering.property.clone());
        }
    }
    columns
}

fn select_list(
    aliases: &mut AliasContext<'_>,
    columns: &[String],
    distinct: bool,
) -> Result<String, CompileError> {
    let default_alias = aliases.root_alias().to_string();
    if columns.is_empty() {
        return Ok(default_alias);
    }

    let mut rendered = Vec::with_capacity(columns.len());
    for column in columns {
        if column.contains("count(*)") {
            // one row per entity even when outer joins multiply them
            let keyword = if distinct || aliases.has_outer_joins() {
                "distinct "
            } else {
                ""
            };
            rendered.push(format!("count({keyword}{default_alias})"));
        } else if count_distinct_property(column).is_some() {
            rendered.push(resolve(aliases, column, false)?);
        } else {
            // a null projected association must not filter the row
            rendered.push(resolve(aliases, column, true)?);
        }
    }
    Ok(rendered.join(", "))
}

fn count_distinct_property(column: &str) -> Option<&str> {
    column
        .strip_prefix("count(distinct")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

fn resolve(aliases: &mut AliasContext<'_>, path: &str, force_outer: bool) -> Result<String, CompileError> {
    aliases
        .substitute_alias(path, false, force_outer)?
        .ok_or_else(|| CompileError::unresolvable_join(aliases.query_class().to_string(), path, path))
}

/// FROM entries with their joins inline, theta entries after every ordinary one
fn from_clause(aliases: &AliasContext<'_>) -> Result<String, CompileError> {
    if aliases.from_entries().is_empty() {
        return Err(CompileError::malformed("no classes to select from"));
    }

    let (theta, ordinary): (Vec<_>, Vec<_>) =
        aliases.from_entries().iter().partition(|entry| entry.theta);

    let entries: Vec<String> = ordinary
        .into_iter()
        .chain(theta)
        .map(|entry| {
            let mut rendered = format!("{} {}", entry.class, entry.alias);
            push_joins(aliases, &entry.alias, &mut rendered);
            rendered
        })
        .collect();
    Ok(entries.join(", "))
}

/// Append the joins hanging off `root_alias`, following `on` joins whose
/// class is not itself a FROM entry
fn push_joins(aliases: &AliasContext<'_>, root_alias: &str, rendered: &mut String) {
    for join in aliases.joins_for(root_alias) {
        rendered.push(' ');
        rendered.push_str(&join.render());
        if join.on_condition().is_some()
            && join.alias() != root_alias
            && !aliases.is_from_alias(join.alias())
        {
            push_joins(aliases, join.alias(), rendered);
        }
    }
}

fn spans_multiple_tables(aliases: &AliasContext<'_>) -> bool {
    aliases.from_entries().len() + aliases.joins().len() > 1
}
