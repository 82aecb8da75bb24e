// Query Assembly Tests
// Projection, ordering, grouping, explicit joins, subqueries and deletes

use common::{compiler, compiler_for};
use filtercrate::{BackendCapabilities, CompileError, Filter, FilterValue, Ordering, QueryOptions};
use sea_orm::DatabaseBackend;
use uuid::Uuid;

mod common;

// ============================================================================
// Projection and Ordering
// ============================================================================

#[test]
fn test_distinct_projection_selects_order_columns() {
    let options = QueryOptions::new()
        .columns(["name"])
        .distinct()
        .order_by(Ordering::desc("manager.name"));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select distinct identityAlias.name, identity_managerAlias0.name \
         from Identity identityAlias \
         left outer join identityAlias.manager identity_managerAlias0 \
         order by identity_managerAlias0.name desc"
    );
    assert!(!compiled.requires_distinct_filter);
    assert!(compiled.spans_multiple_tables);
}

#[test]
fn test_order_by_ignore_case() {
    let options = QueryOptions::new().order_by(Ordering::asc("lastname").ignore_case());

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert!(compiled.text.ends_with("order by upper(identityAlias.lastname)"));
}

#[test]
fn test_order_by_from_json_sort() {
    let options = QueryOptions::new().order_by(Ordering::from_json_sort(r#"["created","DESC"]"#));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert!(compiled.text.ends_with("order by identityAlias.created desc"));
}

#[test]
fn test_distinct_falls_back_to_caller_filtering() {
    let capabilities =
        BackendCapabilities::new(DatabaseBackend::Postgres).with_non_distinct_property("email");
    let options = QueryOptions::new().columns(["name", "email"]).distinct();

    let compiled = compiler_for(capabilities).compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias.name, identityAlias.email from Identity identityAlias"
    );
    assert!(compiled.requires_distinct_filter);
}

#[test]
fn test_entity_distinct_falls_back_to_caller_filtering() {
    let capabilities = BackendCapabilities::new(DatabaseBackend::Postgres).without_entity_distinct();
    let options = QueryOptions::new().distinct();

    let compiled = compiler_for(capabilities).compile("Identity", &options).unwrap();

    assert_eq!(compiled.text, "select identityAlias from Identity identityAlias");
    assert!(compiled.requires_distinct_filter);
}

#[test]
fn test_count_is_distinct_when_outer_joins_exist() {
    let options = QueryOptions::new().columns(["count(*)"]).add(Filter::or(vec![
        Filter::eq("manager.name", "Bob"),
        Filter::eq("name", "Bob"),
    ]));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select count(distinct identityAlias) from Identity identityAlias \
         left outer join identityAlias.manager identity_managerAlias0 \
         where (upper(identity_managerAlias0.name) = :param0 or identityAlias.name = :param1)"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("BOB")));
    assert_eq!(compiled.parameters.get("param1"), Some(&FilterValue::from("Bob")));
}

#[test]
fn test_plain_count() {
    let options = QueryOptions::new().columns(["count(*)"]);

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(compiled.text, "select count(identityAlias) from Identity identityAlias");
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_aggregate_condition_goes_to_having() {
    let options = QueryOptions::new()
        .columns(["manager.name", "count(*)"])
        .group_by(["manager.name"])
        .add(Filter::gt("count(links)", 1));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identity_managerAlias0.name, count(distinct identityAlias) \
         from Identity identityAlias \
         inner join identityAlias.links identity_linksAlias0 \
         left outer join identityAlias.manager identity_managerAlias0 \
         group by identity_managerAlias0.name \
         having count(identity_linksAlias0) > :param0"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from(1)));
}

#[test]
fn test_having_requires_group_by() {
    let options = QueryOptions::new().add(Filter::gt("count(links)", 1));

    let error = compiler().compile("Identity", &options).unwrap_err();

    assert_eq!(
        error,
        CompileError::malformed("A 'group by' is required for conditions that use aggregates")
    );
}

#[test]
fn test_negated_aggregate_condition_keeps_not() {
    let options = QueryOptions::new()
        .group_by(["name"])
        .add(Filter::not(Filter::gt("count(links)", 2)));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         inner join identityAlias.links identity_linksAlias0 \
         group by identityAlias.name \
         having not (count(identity_linksAlias0) > :param0)"
    );
}

#[test]
fn test_or_of_aggregate_conditions_stays_or() {
    let options = QueryOptions::new().group_by(["name"]).add(Filter::or(vec![
        Filter::gt("count(links)", 5),
        Filter::lt("count(links)", 1),
    ]));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         left outer join identityAlias.links identity_linksAlias0 \
         group by identityAlias.name \
         having (count(identity_linksAlias0) > :param0 or count(identity_linksAlias0) < :param1)"
    );
    assert_eq!(compiled.parameters.get("param1"), Some(&FilterValue::from(1)));
}

#[test]
fn test_aggregate_and_plain_condition_split_across_clauses() {
    let options = QueryOptions::new().group_by(["name"]).add(Filter::and(vec![
        Filter::eq("lastname", "Smith"),
        Filter::or(vec![Filter::gt("count(links)", 5), Filter::lt("count(links)", 1)]),
    ]));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert!(compiled.text.contains("where (identityAlias.lastname = :param0)"));
    assert!(compiled.text.ends_with(
        "having (count(identity_linksAlias0) > :param1 or count(identity_linksAlias0) < :param2)"
    ));
}

#[test]
fn test_aggregate_or_plain_condition_is_malformed() {
    let options = QueryOptions::new().group_by(["name"]).add(Filter::or(vec![
        Filter::gt("count(links)", 1),
        Filter::eq("lastname", "Smith"),
    ]));

    let error = compiler().compile("Identity", &options).unwrap_err();

    assert_eq!(
        error,
        CompileError::malformed("Conditions that use aggregates can only be and'ed with other conditions")
    );
}

#[test]
fn test_count_is_plain_when_store_cannot_distinct() {
    let capabilities =
        BackendCapabilities::new(DatabaseBackend::Postgres).with_non_distinct_property("email");
    let options = QueryOptions::new()
        .columns(["email", "count(*)"])
        .group_by(["email"])
        .distinct();

    let compiled = compiler_for(capabilities).compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias.email, count(identityAlias) from Identity identityAlias \
         group by identityAlias.email"
    );
    assert!(compiled.requires_distinct_filter);
}

// ============================================================================
// Case-insensitive Stores and Options
// ============================================================================

#[test]
fn test_case_insensitive_store_never_folds() {
    let capabilities = BackendCapabilities::new(DatabaseBackend::MySql);
    let options = QueryOptions::new()
        .add(Filter::eq("firstname", "Foo").ignore_case())
        .order_by(Ordering::asc("lastname").ignore_case());

    let compiled = compiler_for(capabilities).compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         where identityAlias.firstname = :param0 order by identityAlias.lastname"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("Foo")));
}

#[test]
fn test_query_wide_ignore_case() {
    let options = QueryOptions::new()
        .ignore_case()
        .add(Filter::eq("displayName", "Alice Smith"))
        .add(Filter::eq("lastname", "Smith"));

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert!(compiled.text.ends_with(
        "where (upper(identityAlias.displayName) = :param0 and identityAlias.lastname = :param1)"
    ));
}

#[test]
fn test_options_from_json() {
    let json = r#"{
        "restrictions": [
            {"property": "firstname", "operation": "LIKE", "value": "al", "matchMode": "START"},
            {"operation": "OR", "children": [
                {"property": "inactive", "operation": "EQ", "value": false},
                {"property": "manager", "operation": "ISNULL"}
            ]}
        ],
        "orderings": [{"property": "name"}]
    }"#;
    let options: QueryOptions = serde_json::from_str(json).unwrap();

    let compiled = compiler().compile("Identity", &options).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         where (upper(identityAlias.firstname) like :param0 \
         and (identityAlias.inactive = :param1 or identityAlias.manager is null)) \
         order by identityAlias.name"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("AL%")));
    assert_eq!(compiled.parameters.to_values().len(), 2);
}

// ============================================================================
// Explicit Joins
// ============================================================================

#[test]
fn test_theta_join_collection_condition() {
    let filter = Filter::collection_condition(
        "IdentityExternalAttribute",
        Filter::and(vec![
            Filter::join("id", "IdentityExternalAttribute.objectId"),
            Filter::eq("IdentityExternalAttribute.attributeName", "costCenter"),
            Filter::eq("IdentityExternalAttribute.value", "R&D"),
        ]),
    );

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias, \
         IdentityExternalAttribute identityExternalAttributeAlias0 \
         where (identityAlias.id = identityExternalAttributeAlias0.objectId \
         and identityExternalAttributeAlias0.attributeName = :param0 \
         and identityExternalAttributeAlias0.value = :param1)"
    );
    assert!(compiled.spans_multiple_tables);
}

#[test]
fn test_left_join_renders_on_clause() {
    let filter = Filter::and(vec![
        Filter::left_join("manager", "Certification.creator"),
        Filter::eq("Certification.shortName", "Q1"),
    ]);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         left outer join Certification certificationAlias \
         on identityAlias.manager = certificationAlias.creator \
         where (certificationAlias.shortName = :param0)"
    );
}

#[test]
fn test_join_against_scalar_collection_uses_elements() {
    let filter = Filter::join("tags", "Bundle.type");

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias, Bundle bundleAlias \
         where bundleAlias.type in elements(identityAlias.tags)"
    );
}

// ============================================================================
// Subqueries
// ============================================================================

#[test]
fn test_subquery_parameters_continue_numbering() {
    let filter = Filter::and(vec![
        Filter::eq("name", "a"),
        Filter::subquery("manager", "Identity", "id", Some(Filter::eq("name", "b"))),
        Filter::eq("lastname", "c"),
    ]);

    let compiled = compiler().compile_filter("Identity", &filter).unwrap();

    assert_eq!(
        compiled.text,
        "select identityAlias from Identity identityAlias \
         where (identityAlias.name = :param0 \
         and identityAlias.manager in (select identityAlias.id from Identity identityAlias \
         where identityAlias.name = :param1) \
         and identityAlias.lastname = :param2)"
    );
    let names: Vec<&str> = compiled.parameters.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["param0", "param1", "param2"]);
}

#[test]
fn test_subquery_over_unknown_class() {
    let filter = Filter::subquery("manager", "Nope", "id", None);

    let error = compiler().compile_filter("Identity", &filter).unwrap_err();

    assert_eq!(error, CompileError::metadata_not_found("Nope"));
}

// ============================================================================
// Deletes
// ============================================================================

#[test]
fn test_delete_shares_predicates() {
    let options = QueryOptions::new()
        .add(Filter::eq("application.id", "A"))
        .columns(["name"])
        .order_by(Ordering::asc("name"));

    let compiled = compiler().compile_delete("Link", &options).unwrap();

    assert_eq!(
        compiled.text,
        "delete from Link linkAlias where linkAlias.application.id = :param0"
    );
    assert_eq!(compiled.parameters.get("param0"), Some(&FilterValue::from("A")));
}

#[test]
fn test_delete_without_restrictions() {
    let compiled = compiler()
        .compile_delete("Certification", &QueryOptions::new())
        .unwrap();

    assert_eq!(compiled.text, "delete from Certification certificationAlias");
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_compiled_query_serializes() {
    let compiled = compiler()
        .compile_filter("Identity", &Filter::eq("name", "Alice"))
        .unwrap();

    let json = serde_json::to_value(&compiled).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "text": "select identityAlias from Identity identityAlias where identityAlias.name = :param0",
            "parameters": {"param0": "Alice"},
            "requiresDistinctFilter": false,
            "spansMultipleTables": false
        })
    );
}

#[test]
fn test_parameters_convert_to_sea_values() {
    let id = Uuid::new_v4();
    let filter = Filter::and(vec![Filter::eq("identity.id", id), Filter::eq("displayName", "root")]);

    let compiled = compiler().compile_filter("Link", &filter).unwrap();

    assert!(compiled.text.ends_with(
        "where (linkAlias.identity.id = :param0 and linkAlias.displayName = :param1)"
    ));
    assert_eq!(
        compiled.parameters.to_values(),
        vec![sea_orm::Value::from(id), sea_orm::Value::from("root".to_string())]
    );
}
