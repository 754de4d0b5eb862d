use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::AnnotationRecord;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Error type for annotation database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed annotation store.
///
/// Addresses are stored as SQLite integers (bit-cast `i64`), so the full
/// `u64` range round-trips. Writing the same text twice at one address is a
/// no-op.
#[derive(Debug)]
pub struct AnnotationDb {
    conn: Connection,
}

impl AnnotationDb {
    /// Open (or create) an annotation database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Store `text` at `address`. Returns `false` when the pair already existed.
    pub fn insert_annotation(&self, address: u64, text: &str) -> DbResult<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO annotations (address, text, created_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![address as i64, text, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// List all annotations ordered by address, then insertion order.
    pub fn list_annotations(&self) -> DbResult<Vec<AnnotationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, text, created_at
            FROM annotations
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], map_record)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        // Addresses are stored as i64 bit patterns; sort on the u64 value.
        out.sort_by_key(|record| record.address);
        Ok(out)
    }

    /// Annotations attached to a single address.
    pub fn annotations_at(&self, address: u64) -> DbResult<Vec<AnnotationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT address, text, created_at
            FROM annotations
            WHERE address = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![address as i64], map_record)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnotationRecord> {
    let address: i64 = row.get(0)?;
    Ok(AnnotationRecord { address: address as u64, text: row.get(1)?, created_at: row.get(2)? })
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: annotations table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version < 1 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS annotations (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                address    INTEGER NOT NULL,
                text       TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(address, text)
            );
            CREATE INDEX IF NOT EXISTS annotations_by_address ON annotations(address);

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
