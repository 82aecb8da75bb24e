/*!
# Index Introspection

Reads declared indexes and unique constraints from a live database so the
registry can be built from the real schema instead of a hand-maintained list.
*/

use super::catalog::{Catalog, IndexDecl};
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};

/// Indexes and unique columns found on one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableIndexes {
    pub indexes: Vec<IndexDecl>,
    pub unique_columns: Vec<String>,
}

impl TableIndexes {
    fn add_column(&mut self, index_name: &str, column: String) {
        match self.indexes.iter_mut().find(|i| i.name == index_name) {
            Some(index) => index.columns.push(column),
            None => self.indexes.push(IndexDecl {
                name: index_name.to_string(),
                columns: vec![column],
            }),
        }
    }

    fn add_unique(&mut self, column: String) {
        if !self.unique_columns.contains(&column) {
            self.unique_columns.push(column);
        }
    }
}

/// Quote SQL identifier (double quotes for Postgres/SQLite, backticks for MySQL)
fn quote_identifier(identifier: &str, backend: DatabaseBackend) -> String {
    match backend {
        DatabaseBackend::MySql => format!("`{}`", identifier.replace('`', "``")),
        DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
            format!("\"{}\"", identifier.replace('"', "\"\""))
        }
    }
}

const POSTGRES_INDEX_QUERY: &str = r"
            SELECT
                i.relname AS index_name,
                a.attname AS column_name,
                EXISTS (
                    SELECT 1 FROM pg_constraint c
                    WHERE c.conindid = ix.indexrelid AND c.contype = 'u'
                ) AS is_unique_constraint
            FROM pg_class t
            JOIN pg_index ix ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_attribute a ON t.oid = a.attrelid AND a.attnum = ANY(ix.indkey)
            WHERE t.relname = $1
            AND t.relkind = 'r'
            AND NOT ix.indisprimary
            ORDER BY i.relname, array_position(ix.indkey, a.attnum)
            ";

const MYSQL_INDEX_QUERY: &str = r"
            SELECT
                s.INDEX_NAME AS index_name,
                s.COLUMN_NAME AS column_name,
                (tc.CONSTRAINT_TYPE IS NOT NULL) AS is_unique_constraint
            FROM information_schema.statistics s
            LEFT JOIN information_schema.table_constraints tc
                ON tc.TABLE_SCHEMA = s.TABLE_SCHEMA
                AND tc.TABLE_NAME = s.TABLE_NAME
                AND tc.CONSTRAINT_NAME = s.INDEX_NAME
                AND tc.CONSTRAINT_TYPE = 'UNIQUE'
            WHERE s.TABLE_NAME = ?
            AND s.TABLE_SCHEMA = DATABASE()
            AND s.INDEX_NAME <> 'PRIMARY'
            ORDER BY s.INDEX_NAME, s.SEQ_IN_INDEX
            ";

/// Load the indexes declared on `table_name`
///
/// Primary keys are skipped. Single-column unique constraints are reported in
/// `unique_columns` rather than as indexes.
///
/// # Errors
///
/// Returns a `sea_orm::DbErr` if the catalog queries fail.
pub async fn load_table_indexes<C>(db: &C, table_name: &str) -> Result<TableIndexes, DbErr>
where
    C: ConnectionTrait,
{
    match db.get_database_backend() {
        DatabaseBackend::Sqlite => load_sqlite_indexes(db, table_name).await,
        DatabaseBackend::Postgres => {
            load_catalog_indexes(db, table_name, DatabaseBackend::Postgres, POSTGRES_INDEX_QUERY).await
        }
        DatabaseBackend::MySql => {
            load_catalog_indexes(db, table_name, DatabaseBackend::MySql, MYSQL_INDEX_QUERY).await
        }
    }
}

async fn load_catalog_indexes<C>(
    db: &C,
    table_name: &str,
    backend: DatabaseBackend,
    query: &str,
) -> Result<TableIndexes, DbErr>
where
    C: ConnectionTrait,
{
    let statement = Statement::from_sql_and_values(backend, query, [table_name.into()]);
    let rows = db.query_all(statement).await?;

    let mut constraint_columns: Vec<(String, String)> = Vec::new();
    let mut result = TableIndexes::default();
    for row in rows {
        let index_name: String = row.try_get("", "index_name")?;
        let column_name: String = row.try_get("", "column_name")?;
        let is_constraint: bool = row.try_get("", "is_unique_constraint")?;

        if is_constraint {
            constraint_columns.push((index_name, column_name));
        } else {
            result.add_column(&index_name, column_name);
        }
    }

    for (index_name, column) in &constraint_columns {
        let width = constraint_columns.iter().filter(|(n, _)| n == index_name).count();
        if width == 1 {
            result.add_unique(column.clone());
        }
    }

    Ok(result)
}

/// `SQLite` indexes (special handling required)
async fn load_sqlite_indexes<C>(db: &C, table_name: &str) -> Result<TableIndexes, DbErr>
where
    C: ConnectionTrait,
{
    let mut result = TableIndexes::default();

    let quoted_table = quote_identifier(table_name, DatabaseBackend::Sqlite);
    let index_list_query = Statement::from_string(
        DatabaseBackend::Sqlite,
        format!("PRAGMA index_list({quoted_table})"),
    );

    for row in db.query_all(index_list_query).await? {
        let index_name: String = row.try_get("", "name")?;
        // c = CREATE INDEX, u = UNIQUE constraint, pk = PRIMARY KEY
        let origin: String = row.try_get("", "origin")?;
        if origin == "pk" {
            continue;
        }

        let quoted_index = quote_identifier(&index_name, DatabaseBackend::Sqlite);
        let index_info_query = Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("PRAGMA index_info({quoted_index})"),
        );

        let mut columns = Vec::new();
        for info_row in db.query_all(index_info_query).await? {
            let column_name: String = info_row.try_get("", "name")?;
            columns.push(column_name);
        }

        if origin == "u" {
            if let [column] = columns.as_slice() {
                result.add_unique(column.clone());
            }
            continue;
        }

        for column in columns {
            result.add_column(&index_name, column);
        }
    }

    Ok(result)
}

/// Fill every entity's index list and unique flags from the database
///
/// Indexes already declared in the catalog are kept; database indexes with the
/// same name replace them.
///
/// # Errors
///
/// Returns a `sea_orm::DbErr` if reading any table's indexes fails.
pub async fn apply_database_indexes<C>(db: &C, catalog: &mut Catalog) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    for entity in &mut catalog.entities {
        if entity.is_abstract {
            continue;
        }

        let found = load_table_indexes(db, &entity.table).await?;
        tracing::debug!(
            table = %entity.table,
            indexes = found.indexes.len(),
            unique_columns = found.unique_columns.len(),
            "Loaded table indexes"
        );

        for index in found.indexes {
            entity.indexes.retain(|existing| existing.name != index.name);
            entity.indexes.push(index);
        }

        for property in &mut entity.properties {
            if found.unique_columns.iter().any(|c| c == property.column_name()) {
                property.unique = true;
            }
        }
    }

    Ok(())
}
