// Compile Scenario Tests
// End-to-end filter compilation against the identity catalog

use chrono::{TimeZone, Utc};
use common::compiler;
use filtercrate::{CompileError, Filter, FilterValue, QueryOptions};

mod common;

// ============================================================================
// Basic Scenarios
// ============================================================================

#[test]
fn test_and_of_comparisons() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let filter = Filter::and(vec![Filter::eq("name", "Alice"), Filter::gt("created", t0)]);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         where (identityAlias.name = :param0 and identityAlias.created > :param1)"
    );
    assert_eq!(compiled.parameters.len(), 2);
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("Alice")));
    assert_eq!(compiled.parameters.get("param1"), Some(&FilterValue::from(t0)));
    assert!(!compiled.spans_multiple_tables);
}

#[test]
fn test_compilation_is_idempotent() {
    let filter = Filter::and(vec![
        Filter::like("displayName", "smi", filtercrate::MatchMode::Anywhere).ignore_case(),
        Filter::or(vec![Filter::eq("manager.name", "Bob"), Filter::is_null("manager")]),
        Filter::collection_condition(
            "links",
            Filter::and(vec![
                Filter::eq("application.id", "A"),
                Filter::ne("nativeIdentity", "root"),
            ]),
        ),
    ]);
    let compiler = compiler();

    let first = compiler.compile_filter("Identity", &filter).unwrap();
    let second = compiler.compile_filter("Identity", &filter).unwrap();

    assert_eq!(first, second);
}

// ============================================================================
// Double Negation
// ============================================================================

#[test]
fn test_double_negation_compiles_like_the_inner_filter() {
    let compiler = compiler();

    let doubled = Filter::not(Filter::not(Filter::eq("name", "Alice")));
    assert_eq!(
        compiler.compile_filter("Identity", &doubled).unwrap(),
        compiler.compile_filter("Identity", &Filter::eq("name", "Alice")).unwrap()
    );

    let doubled = Filter::not(Filter::not(Filter::not_null("manager")));
    assert_eq!(
        compiler.compile_filter("Identity", &doubled).unwrap(),
        compiler.compile_filter("Identity", &Filter::not_null("manager")).unwrap()
    );
}

#[test]
fn test_not_over_not_null_is_is_null() {
    let compiler = compiler();
    let compiled = compiler
        .compile_filter("Identity", &Filter::not(Filter::not_null("manager")))
        .unwrap();
    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias where identityAlias.manager is null"
    );
}

// ============================================================================
// Collection Conditions
// ============================================================================

#[test]
fn test_or_of_equalities_uses_one_inner_join() {
    let filter = Filter::collection_condition(
        "links",
        Filter::or(vec![
            Filter::eq("application.id", "A"),
            Filter::eq("application.id", "B"),
        ]),
    );

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         inner join identityAlias.links identity_linksAlias0 \
         where (identity_linksAlias0.application.id in (:param0, :param1))"
    );
    assert_eq!(compiled.text.matches(" join ").count(), 1);
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("A")));
    assert_eq!(compiled.parameters.get("param1"), Some(&FilterValue::from("B")));
}

#[test]
fn test_collapsed_in_keeps_order_and_ignore_case() {
    let filter = Filter::collection_condition(
        "links",
        Filter::or(vec![
            Filter::eq("nativeIdentity", "c"),
            Filter::eq("nativeIdentity", "a").ignore_case(),
            Filter::eq("nativeIdentity", "b"),
        ]),
    );

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert!(compiled.text.ends_with(
        "where (upper(identity_linksAlias0.nativeIdentity) in (:param0, :param1, :param2))"
    ));
    let values: Vec<&FilterValue> = compiled.parameters.iter().map(|(_, v)| v).collect();
    assert_eq!(
        values,
        [&FilterValue::from("C"), &FilterValue::from("A"), &FilterValue::from("B")]
    );
}

#[test]
fn test_optimizer_can_be_disabled() {
    let filter = Filter::collection_condition(
        "links",
        Filter::or(vec![
            Filter::eq("application.id", "A"),
            Filter::eq("application.id", "B"),
        ]),
    );
    let options = QueryOptions::new().add(filter).disable_optimizer();

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert!(compiled.text.contains("left outer join identityAlias.links identity_linksAlias0"));
    assert!(compiled.text.ends_with(
        "where (identity_linksAlias0.application.id = :param0 \
         or identity_linksAlias0.application.id = :param1)"
    ));
}

#[test]
fn test_negated_membership_uses_positive_subquery() {
    let filter = Filter::collection_condition("links", Filter::ne("application.id", "X"));

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         where identityAlias not in (select linkAlias.identity from Link linkAlias \
         where (linkAlias.application.id = :param0))"
    );
    assert!(!compiled.text.contains("!="));
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("X")));
}

#[test]
fn test_mixed_membership_joins_plain_part_and_excludes_negated_part() {
    let filter = Filter::collection_condition(
        "links",
        Filter::and(vec![
            Filter::eq("application.id", "A"),
            Filter::ne("application.id", "X"),
        ]),
    );

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         inner join identityAlias.links identity_linksAlias0 \
         where ((identity_linksAlias0.application.id = :param0) \
         and identityAlias not in (select linkAlias.identity from Link linkAlias \
         where (linkAlias.application.id = :param1)))"
    );
}

#[test]
fn test_mixed_or_membership_stays_grouped_under_and() {
    let filter = Filter::and(vec![
        Filter::eq("inactive", false),
        Filter::collection_condition(
            "links",
            Filter::or(vec![
                Filter::eq("nativeIdentity", "a"),
                Filter::ne("displayName", "X"),
            ]),
        ),
    ]);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    // identities without links satisfy the negated branch, so the join is outer
    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         left outer join identityAlias.links identity_linksAlias0 \
         where (identityAlias.inactive = :param0 \
         and ((identity_linksAlias0.nativeIdentity = :param1) \
         or identityAlias not in (select linkAlias.identity from Link linkAlias \
         where (linkAlias.displayName = :param2))))"
    );
    assert_eq!(compiled.parameters.get("param2"), Some(&FilterValue::from("X")));
}

#[test]
fn test_negated_membership_needs_back_reference() {
    let filter = Filter::collection_condition("assignedRoles", Filter::ne("type", "it"));

    let error = compiler().compile_filter("Identity", &filter).unwrap_err();

    assert_eq!(error, CompileError::missing_back_reference("Identity", "assignedRoles"));
}

#[test]
fn test_unknown_collection_is_unresolvable() {
    let filter = Filter::collection_condition("accounts", Filter::eq("name", "x"));

    let error = compiler().compile_filter("Identity", &filter).unwrap_err();

    assert!(matches!(error, CompileError::UnresolvableJoin { .. }));
}

// ============================================================================
// Case Folding
// ============================================================================

#[test]
fn test_case_insensitive_index_folds() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("firstname", "Foo"))
        .unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias where upper(identityAlias.firstname) = :param0"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("FOO")));
}

#[test]
fn test_case_insensitive_annotation_folds() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("email", "Alice@Example.com"))
        .unwrap();

    assert!(compiled.text.ends_with("where upper(identityAlias.email) = :param0"));
    assert_eq!(
        compiled.parameters.get("param0"),
        Some(&FilterValue::from("ALICE@EXAMPLE.COM"))
    );
}

#[test]
fn test_unique_column_folds() {
    let compiled = compiler()
        .compile_filter("Application", &Filter::eq("name", "Active Directory"))
        .unwrap();

    assert!(compiled.text.ends_with("where upper(applicationAlias.name) = :param0"));
}

#[test]
fn test_plain_index_ignores_requested_folding() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("lastname", "Smith").ignore_case())
        .unwrap();

    assert!(compiled.text.ends_with("where identityAlias.lastname = :param0"));
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("Smith")));
}

#[test]
fn test_identifiers_never_fold() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("manager.id", "abc").ignore_case())
        .unwrap();

    assert!(compiled.text.ends_with("where identityAlias.manager.id = :param0"));
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("abc")));
}

#[test]
fn test_eszett_survives_folding() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("firstname", "Strauß"))
        .unwrap();

    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("STRAUß")));
}

#[test]
fn test_like_escapes_and_folds() {
    let filter = Filter::like("firstname", "100%", filtercrate::MatchMode::Start);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert!(
        compiled
            .text
            .ends_with("where upper(identityAlias.firstname) like :param0 escape '@'")
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("100@%%")));
}

// ============================================================================
// CONTAINS_ALL
// ============================================================================

#[test]
fn test_contains_all_on_collection_element_is_unsupported() {
    let filter = Filter::collection_condition(
        "links",
        Filter::contains_all("nativeIdentity", vec!["a", "b"]),
    );

    let error = compiler().compile_filter("Identity", &filter).unwrap_err();

    assert_eq!(error, CompileError::unsupported_contains_all("nativeIdentity", 2));
    assert!(error.is_caller_error());
}

#[test]
fn test_contains_all_with_one_value_is_eq() {
    let compiler = compiler();
    assert_eq!(
        compiler
            .compile_filter("Identity", &Filter::contains_all("name", vec!["Alice"]))
            .unwrap(),
        compiler.compile_filter("Identity", &Filter::eq("name", "Alice")).unwrap()
    );
}

#[test]
fn test_contains_all_through_collection_joins_per_value() {
    let filter = Filter::contains_all("links.nativeIdentity", vec!["a", "b"]);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         inner join identityAlias.links identity_linksAlias0 \
         inner join identityAlias.links identity_linksAlias1 \
         where identity_linksAlias0.nativeIdentity = :param0 \
         and identity_linksAlias1.nativeIdentity = :param1"
    );
}
