//! Read-only catalog queries.
//!
//! Used to find scratch databases that failing tests left behind and to check
//! what a schema application actually produced.

use crate::error::{ScratchError, ScratchResult};
use crate::ident::{DATABASE_PREFIX, DatabaseName};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};
use std::collections::BTreeMap;
use tracing::debug;

mod queries {
    pub const LIST_SCRATCH_DATABASES: &str = r#"
        SELECT
            datname::text AS name,
            shobj_description(oid, 'pg_database') AS comment,
            pg_database_size(datname) AS size_bytes
        FROM pg_database
        WHERE datistemplate = false
          AND datname LIKE $1
        ORDER BY datname
        "#;

    pub const DATABASE_EXISTS: &str =
        "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)";

    pub const TABLE_COLUMNS: &str = r#"
        SELECT
            column_name::text,
            data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name = $1
        ORDER BY ordinal_position
        "#;
}

/// A scratch database present on the server.
#[derive(Debug, Clone, Serialize)]
pub struct ScratchDatabase {
    pub name: DatabaseName,
    /// Owning test, as recorded at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Size formatted with the `humansize` WINDOWS preset (1024-based).
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// `LIKE` pattern matching the scratch prefix literally.
fn prefix_pattern() -> String {
    format!("{}%", DATABASE_PREFIX.replace('_', "\\_"))
}

/// List scratch databases. Databases that share the prefix but were not
/// generated by this crate are skipped.
pub async fn list_scratch_databases(
    conn: &mut PgConnection,
) -> ScratchResult<Vec<ScratchDatabase>> {
    let rows: Vec<(String, Option<String>, Option<i64>)> =
        sqlx::query_as(queries::LIST_SCRATCH_DATABASES)
            .bind(prefix_pattern())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| ScratchError::catalog("list scratch databases", e))?;

    let databases = rows
        .into_iter()
        .filter_map(|(name, comment, size)| match DatabaseName::parse(&name) {
            Ok(name) => Some(ScratchDatabase {
                name,
                comment,
                size_bytes: size.and_then(|s| u64::try_from(s).ok()),
            }),
            Err(_) => {
                debug!(database = %name, "Skipping database that only shares the scratch prefix");
                None
            }
        })
        .collect();

    Ok(databases)
}

/// Whether a database named `name` exists on the server.
pub async fn database_exists<'c, E>(executor: E, name: &str) -> ScratchResult<bool>
where
    E: PgExecutor<'c>,
{
    sqlx::query_scalar(queries::DATABASE_EXISTS)
        .bind(name)
        .fetch_one(executor)
        .await
        .map_err(|e| ScratchError::catalog("database exists", e))
}

/// Column name → declared data type for `table` in the current schema.
pub async fn table_columns<'c, E>(
    executor: E,
    table: &str,
) -> ScratchResult<BTreeMap<String, String>>
where
    E: PgExecutor<'c>,
{
    let rows: Vec<(String, String)> = sqlx::query_as(queries::TABLE_COLUMNS)
        .bind(table)
        .fetch_all(executor)
        .await
        .map_err(|e| ScratchError::catalog("table columns", e))?;

    Ok(rows.into_iter().collect())
}
