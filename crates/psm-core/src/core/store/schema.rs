//! Creation of empty access-control databases.
//!
//! The table layout mirrors what the OS itself ships for each generation; any
//! deviation makes the privacy daemon reject the file.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use anyhow::Result;
use psm_domain::SchemaGeneration;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use super::PrivacyError;

/// Value of the `version` row in the `admin` table.
pub const ADMIN_SCHEMA_VERSION: i64 = 7;

const ADMIN_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS admin
    (key TEXT PRIMARY KEY NOT NULL, value INTEGER NOT NULL)";

const ACCESS_TABLE_V12: &str = "
    CREATE TABLE IF NOT EXISTS access
    (service TEXT NOT NULL,
    client TEXT NOT NULL,
    client_type INTEGER NOT NULL,
    allowed INTEGER NOT NULL,
    prompt_count INTEGER NOT NULL,
    CONSTRAINT key PRIMARY KEY (service, client, client_type))";

const ACCESS_TABLE_V13: &str = "
    CREATE TABLE IF NOT EXISTS access
    (service TEXT NOT NULL,
    client TEXT NOT NULL,
    client_type INTEGER NOT NULL,
    allowed INTEGER NOT NULL,
    prompt_count INTEGER NOT NULL,
    csreq BLOB,
    CONSTRAINT key PRIMARY KEY (service, client, client_type))";

const ACCESS_TIMES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS access_times
    (service TEXT NOT NULL,
    client TEXT NOT NULL,
    client_type INTEGER NOT NULL,
    last_used_time INTEGER NOT NULL,
    CONSTRAINT key PRIMARY KEY (service, client, client_type))";

const ACCESS_OVERRIDES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS access_overrides
    (service TEXT PRIMARY KEY NOT NULL)";

/// Tables every generation carries.
pub const TABLES: [&str; 4] = ["access", "access_overrides", "access_times", "admin"];

fn access_table(generation: SchemaGeneration) -> &'static str {
    match generation {
        SchemaGeneration::V12 => ACCESS_TABLE_V12,
        SchemaGeneration::V13Plus => ACCESS_TABLE_V13,
    }
}

/// Creates an empty access database at `path` for `generation`.
///
/// Parent directories are created `0700`. A failure leaves whatever was written
/// in place; rerunning against the same file is harmless.
///
/// # Errors
/// Returns `SchemaCreationFailed` when any step fails.
pub fn create_access_store(path: &Path, generation: SchemaGeneration) -> Result<()> {
    info!(path = %path.display(), ?generation, "access database not found; creating");
    build(path, generation).map_err(|err| PrivacyError::SchemaCreationFailed {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    })?;
    info!(path = %path.display(), "access database created");
    Ok(())
}

fn build(path: &Path, generation: SchemaGeneration) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.exists()) {
        DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
    }
    let mut conn = Connection::open(path)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(ADMIN_TABLE, [])?;
    tx.execute(
        "INSERT OR IGNORE INTO admin VALUES ('version', ?1)",
        [ADMIN_SCHEMA_VERSION],
    )?;
    tx.execute(access_table(generation), [])?;
    tx.execute(ACCESS_TIMES_TABLE, [])?;
    tx.execute(ACCESS_OVERRIDES_TABLE, [])?;
    tx.commit()?;
    Ok(())
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Names of all user tables, sorted.
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Generation implied by the physical `access` table, if it matches one.
pub fn detect_generation(conn: &Connection) -> Result<Option<SchemaGeneration>> {
    let columns = table_columns(conn, "access")?;
    let has_csreq = columns.iter().any(|name| name == "csreq");
    Ok([SchemaGeneration::V12, SchemaGeneration::V13Plus]
        .into_iter()
        .find(|generation| {
            generation.access_columns() == columns.len() && generation.has_csreq() == has_csreq
        }))
}
