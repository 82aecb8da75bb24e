//! Deciding when a comparison is case-insensitive, and folding values to match.
//!
//! Folding wraps the column in `upper(...)` and binds an uppercased value. It
//! is only worth doing when an index can serve it (a case-insensitive index)
//! or when no index exists at all; folding a column that has a plain index
//! throws the index away.

use crate::capabilities::DatabaseCapabilities;
use crate::filter::FilterValue;
use crate::metadata::PropertyMapping;

/// Stand-in for `ß` while uppercasing
///
/// `str::to_uppercase` turns `ß` into `SS` while SQL `UPPER` leaves it alone,
/// so a folded search for `ß` could never match. Only this character is
/// special-cased.
pub const ESZETT_PLACEHOLDER: char = '\u{9999}';

/// Uppercase `value` the way the database's `UPPER` does
#[must_use]
pub fn upper_case(value: &str) -> String {
    if value.contains('ß') {
        value
            .replace('ß', &ESZETT_PLACEHOLDER.to_string())
            .to_uppercase()
            .replace(ESZETT_PLACEHOLDER, "ß")
    } else {
        value.to_uppercase()
    }
}

/// Uppercase every string inside `value`
#[must_use]
pub fn fold_value(value: &FilterValue) -> FilterValue {
    match value {
        FilterValue::String(s) => FilterValue::String(upper_case(s)),
        FilterValue::List(values) => FilterValue::List(values.iter().map(fold_value).collect()),
        other => other.clone(),
    }
}

/// Whether a comparison of `property` against `value` should be folded
///
/// `mapping` is the metadata for `property` when it names a property of a
/// mapped class directly; dotted paths usually have none. `requested` is the
/// caller's flag, already combined with any query-wide ignore-case option.
#[must_use]
pub fn resolve_ignore_case(
    capabilities: &dyn DatabaseCapabilities,
    class: &str,
    property: &str,
    mapping: Option<&PropertyMapping>,
    value: &FilterValue,
    requested: bool,
) -> bool {
    if capabilities.is_case_insensitive() {
        return false;
    }

    // callers routinely set ignore case on identifiers
    if property == "id" || property.ends_with(".id") {
        return false;
    }

    let is_string = match value {
        FilterValue::List(values) => matches!(values.first(), Some(FilterValue::String(_))),
        other => matches!(other, FilterValue::String(_)),
    };
    if !is_string {
        return false;
    }

    let Some(mapping) = mapping else {
        return property.ends_with(".name") || property.ends_with(".displayName") || requested;
    };

    if mapping.is_case_insensitive() {
        if !requested {
            tracing::info!(
                class = %class,
                property = %property,
                "Ignore case missing for case insensitive index"
            );
        }
        return true;
    }

    if !requested {
        return false;
    }

    if mapping.has_normal_index {
        tracing::warn!(
            class = %class,
            property = %property,
            "Ignore case used with a case sensitive index, comparing case sensitively"
        );
        return false;
    }

    if mapping.has_annotation_index {
        tracing::warn!(
            class = %class,
            property = %property,
            "Ignore case used with a case sensitive annotation index"
        );
    }
    true
}
