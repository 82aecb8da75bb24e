//! Filter rewrites applied before compilation.
//!
//! Both passes return a new tree; the caller's filter is never touched.

use crate::filter::{BooleanOp, CompositeFilter, Filter, FilterValue, LeafFilter, LogicalOp};

/// Only collection conditions are worth rewriting; everywhere else the
/// database plans an OR of equalities as well as an IN.
fn looks_slow(leaf: &LeafFilter) -> bool {
    leaf.is_collection_condition()
}

/// Collapse OR-of-EQ groups inside collection conditions into IN leaves
///
/// `links OR(application.id = A, application.id = B)` would otherwise need
/// an outer join per branch; as `application.id in (A, B)` it needs one inner join.
#[must_use]
pub fn optimize(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(leaf) if looks_slow(leaf) => {
            let mut leaf = leaf.clone();
            if let Some(condition) = leaf.collection_condition.take() {
                leaf.collection_condition = Some(Box::new(collapse_composite(&condition)));
            }
            Filter::Leaf(leaf)
        }
        Filter::Leaf(_) => filter.clone(),
        Filter::Composite(composite) => Filter::Composite(CompositeFilter::new(
            composite.operation,
            composite.children.iter().map(optimize).collect(),
        )),
    }
}

fn collapse(filter: &Filter) -> Filter {
    match filter {
        Filter::Composite(composite) => Filter::Composite(collapse_composite(composite)),
        // nested collection conditions are collapsed too
        Filter::Leaf(_) => optimize(filter),
    }
}

fn collapse_composite(composite: &CompositeFilter) -> CompositeFilter {
    if composite.operation == BooleanOp::Or {
        if let Some(collapsed) = collapse_equalities(&composite.children) {
            return CompositeFilter::new(BooleanOp::Or, vec![Filter::Leaf(collapsed)]);
        }
    }
    CompositeFilter::new(
        composite.operation,
        composite.children.iter().map(collapse).collect(),
    )
}

/// IN leaf equivalent to `children` when they are all plain EQs on one property
fn collapse_equalities(children: &[Filter]) -> Option<LeafFilter> {
    if children.len() < 2 {
        return None;
    }

    let leaves: Vec<&LeafFilter> = children.iter().map(Filter::as_leaf).collect::<Option<_>>()?;
    let first = leaves[0];

    let collapsible = leaves.iter().all(|leaf| {
        leaf.operation == LogicalOp::Eq
            && leaf.property == first.property
            && leaf.cast.is_none()
            && !matches!(
                leaf.value,
                FilterValue::Null | FilterValue::Entity(_) | FilterValue::List(_)
            )
    });
    if !collapsible {
        return None;
    }

    let values = leaves.iter().map(|leaf| leaf.value.clone()).collect();
    let mut collapsed = LeafFilter::new(LogicalOp::In, first.property.clone(), FilterValue::List(values));
    collapsed.ignore_case = leaves.iter().any(|leaf| leaf.ignore_case);
    Some(collapsed)
}

/// Move collection conditions after their siblings in every composite
///
/// Plain predicates then resolve their joins in the root scope before any
/// collection scope is opened, which keeps alias numbering stable.
#[must_use]
pub fn reorder_collection_conditions(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(leaf) => {
            let mut leaf = leaf.clone();
            if let Some(condition) = leaf.collection_condition.take() {
                leaf.collection_condition = Some(Box::new(reorder_composite(&condition)));
            }
            Filter::Leaf(leaf)
        }
        Filter::Composite(composite) => Filter::Composite(reorder_composite(composite)),
    }
}

fn reorder_composite(composite: &CompositeFilter) -> CompositeFilter {
    let (collections, plain): (Vec<Filter>, Vec<Filter>) = composite
        .children
        .iter()
        .map(reorder_collection_conditions)
        .partition(|child| child.as_leaf().is_some_and(LeafFilter::is_collection_condition));

    CompositeFilter::new(composite.operation, plain.into_iter().chain(collections).collect())
}
