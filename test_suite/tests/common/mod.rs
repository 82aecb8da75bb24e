use filtercrate::metadata::{
    AnnotationIndex, Catalog, EntityDescriptor, MetadataRegistry, PropertyDescriptor,
};
use filtercrate::{BackendCapabilities, QueryCompiler};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// Helper function to get database URL from environment or default to SQLite
fn get_test_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string())
}

/// Route compiler logs to the test output; `RUST_LOG=filtercrate=debug` shows queries
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Identity management model used across the suite
///
/// - `Identity.firstname` has a case-insensitive schema index
/// - `Identity.lastname` has a plain schema index
/// - `Identity.email` has a case-insensitive annotation index
/// - `Application.name` is unique
/// - `Identity.assignedRoles` has no back reference
pub fn identity_catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntityDescriptor::new("SailPointObject", "spt_object")
                .abstract_class()
                .property(PropertyDescriptor::scalar("name"))
                .property(PropertyDescriptor::scalar("created"))
                .property(PropertyDescriptor::scalar("modified")),
        )
        .with_entity(
            EntityDescriptor::new("Identity", "spt_identity")
                .extends("SailPointObject")
                .property(PropertyDescriptor::scalar("firstname"))
                .property(PropertyDescriptor::scalar("lastname"))
                .property(PropertyDescriptor::scalar("displayName").column("display_name"))
                .property(PropertyDescriptor::scalar("email"))
                .property(PropertyDescriptor::scalar("inactive"))
                .property(PropertyDescriptor::many_to_one("manager", "Identity"))
                .property(PropertyDescriptor::one_to_many("links", "Link", Some("identity")))
                .property(PropertyDescriptor::one_to_many("assignedRoles", "Bundle", None))
                .property(PropertyDescriptor::scalar_collection("tags"))
                .index("spt_identity_firstname_ci", &["firstname"])
                .index("spt_identity_lastname", &["lastname"]),
        )
        .with_entity(
            EntityDescriptor::new("Link", "spt_link")
                .extends("SailPointObject")
                .property(PropertyDescriptor::scalar("nativeIdentity").column("native_identity"))
                .property(PropertyDescriptor::scalar("displayName").column("display_name"))
                .property(PropertyDescriptor::many_to_one("identity", "Identity"))
                .property(PropertyDescriptor::many_to_one("application", "Application"))
                .property(PropertyDescriptor::scalar_collection("entitlements")),
        )
        .with_entity(
            EntityDescriptor::new("Application", "spt_application")
                .property(PropertyDescriptor::scalar("name").unique())
                .property(PropertyDescriptor::scalar("type"))
                .property(PropertyDescriptor::scalar("created")),
        )
        .with_entity(
            EntityDescriptor::new("Bundle", "spt_bundle")
                .extends("SailPointObject")
                .property(PropertyDescriptor::scalar("type"))
                .property(PropertyDescriptor::many_to_one("owner", "Identity")),
        )
        .with_entity(
            EntityDescriptor::new("IdentityExternalAttribute", "spt_identity_external_attr")
                .property(PropertyDescriptor::scalar("objectId").column("object_id"))
                .property(PropertyDescriptor::scalar("attributeName").column("attribute_name"))
                .property(PropertyDescriptor::scalar("value")),
        )
        .with_entity(
            EntityDescriptor::new("Certification", "spt_certification")
                .extends("SailPointObject")
                .property(PropertyDescriptor::scalar("shortName").column("short_name"))
                .property(PropertyDescriptor::many_to_one("creator", "Identity"))
                .property(PropertyDescriptor::scalar_collection("certifiers")),
        )
        .with_annotation_index(
            AnnotationIndex::on_property("Identity", "spt_identity_email_ci", "email")
                .case_insensitive(),
        )
}

pub fn identity_registry() -> Arc<MetadataRegistry> {
    Arc::new(MetadataRegistry::build(identity_catalog()))
}

/// Compiler for a case-sensitive store
pub fn compiler() -> QueryCompiler {
    compiler_for(BackendCapabilities::new(DatabaseBackend::Postgres))
}

pub fn compiler_for(capabilities: BackendCapabilities) -> QueryCompiler {
    init_tracing();
    QueryCompiler::new(identity_registry(), capabilities)
}

/// Database with the identity tables and their indexes, for index introspection
#[allow(dead_code)]
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(&get_test_database_url()).await?;

    db.execute_unprepared("DROP TABLE IF EXISTS spt_link").await?;
    db.execute_unprepared("DROP TABLE IF EXISTS spt_identity").await?;

    db.execute_unprepared(
        "CREATE TABLE spt_identity (
            id VARCHAR(32) PRIMARY KEY,
            name VARCHAR(128) NOT NULL,
            created BIGINT,
            modified BIGINT,
            firstname VARCHAR(128),
            lastname VARCHAR(128),
            display_name VARCHAR(128),
            email VARCHAR(128) UNIQUE,
            inactive BOOLEAN,
            manager VARCHAR(32)
        )",
    )
    .await?;
    db.execute_unprepared("CREATE INDEX spt_identity_dname_ci ON spt_identity (display_name)")
        .await?;
    db.execute_unprepared("CREATE INDEX spt_identity_lastname ON spt_identity (lastname)")
        .await?;

    db.execute_unprepared(
        "CREATE TABLE spt_link (
            id VARCHAR(32) PRIMARY KEY,
            name VARCHAR(128),
            created BIGINT,
            modified BIGINT,
            native_identity VARCHAR(322),
            display_name VARCHAR(128),
            identity_id VARCHAR(32),
            application VARCHAR(32)
        )",
    )
    .await?;
    db.execute_unprepared("CREATE INDEX spt_link_native_identity_ci ON spt_link (native_identity)")
        .await?;

    Ok(db)
}
