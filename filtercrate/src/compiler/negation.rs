//! Negation handling for collection conditions.
//!
//! A negative condition compared row by row against a one-to-many join is
//! wrong: `links.application.id != 'X'` admits the owner as soon as any single
//! link points elsewhere. Negated parts of a collection condition are therefore
//! inverted into the positive condition and excluded with
//! `owner not in (select inverse from Element where positive)`.

use crate::filter::{BooleanOp, CompositeFilter, Filter, LogicalOp};

/// NOT composites and the NE / NOTNULL leaves
#[must_use]
pub fn is_negated(filter: &Filter) -> bool {
    match filter {
        Filter::Composite(composite) => composite.operation == BooleanOp::Not,
        Filter::Leaf(leaf) => matches!(leaf.operation, LogicalOp::Ne | LogicalOp::NotNull),
    }
}

/// Positive form of a negated filter
///
/// A multi-child NOT negates the AND of its children, so it inverts to that AND.
fn invert(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(leaf) => match leaf.operation.inverse() {
            Some(operation) => Filter::Leaf(leaf.with_operation(operation, leaf.value.clone())),
            None => filter.clone(),
        },
        Filter::Composite(composite) => match composite.children.as_slice() {
            [only] => only.clone(),
            children => Filter::and(children.to_vec()),
        },
    }
}

fn flip(operation: BooleanOp) -> BooleanOp {
    match operation {
        BooleanOp::And => BooleanOp::Or,
        BooleanOp::Or => BooleanOp::And,
        BooleanOp::Not => BooleanOp::Not,
    }
}

/// Split a collection condition into its plain part and its inverted negated part
///
/// Inverting the negated children flips the connective by De Morgan:
/// `a != x and b != y` excludes owners having an element with `a = x or b = y`.
#[must_use]
pub fn split(condition: &CompositeFilter) -> (Option<CompositeFilter>, Option<CompositeFilter>) {
    if condition.operation == BooleanOp::Not {
        let positive = CompositeFilter::new(BooleanOp::And, condition.children.clone());
        return (None, Some(positive));
    }

    let (negated, plain): (Vec<&Filter>, Vec<&Filter>) =
        condition.children.iter().partition(|child| is_negated(child));

    let plain = (!plain.is_empty()).then(|| {
        CompositeFilter::new(condition.operation, plain.into_iter().cloned().collect())
    });
    let negated = (!negated.is_empty()).then(|| {
        CompositeFilter::new(
            flip(condition.operation),
            negated.into_iter().map(invert).collect(),
        )
    });
    (plain, negated)
}

/// Remove double negations anywhere in the tree
///
/// `NOT(NOT(x))` becomes `x`, and a NOT over a single NE or NOTNULL leaf
/// becomes the inverse leaf. Collection conditions are left alone: a negation
/// there quantifies over the elements and is handled by [`split`].
#[must_use]
pub fn fold_double_negation(filter: &Filter) -> Filter {
    match filter {
        Filter::Leaf(_) => filter.clone(),
        Filter::Composite(composite) if composite.operation == BooleanOp::Not => {
            match composite.children.as_slice() {
                [Filter::Composite(inner)] if inner.operation == BooleanOp::Not => {
                    match inner.children.as_slice() {
                        [only] => fold_double_negation(only),
                        children => fold_double_negation(&Filter::and(children.to_vec())),
                    }
                }
                [single @ Filter::Leaf(leaf)]
                    if matches!(leaf.operation, LogicalOp::Ne | LogicalOp::NotNull) =>
                {
                    invert(single)
                }
                children => Filter::Composite(CompositeFilter::new(
                    BooleanOp::Not,
                    children.iter().map(fold_double_negation).collect(),
                )),
            }
        }
        Filter::Composite(composite) => Filter::Composite(CompositeFilter::new(
            composite.operation,
            composite.children.iter().map(fold_double_negation).collect(),
        )),
    }
}
