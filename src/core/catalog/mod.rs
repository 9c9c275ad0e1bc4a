//! SQLite-backed catalog store
//!
//! Holds every catalog entity the ingestion engine reads and writes:
//! partners and reference data, courses with their draft/official twins,
//! runs, seats, entitlements, programs and degrees, geo value objects,
//! product values and course editors.
//!
//! Default lookups hide drafts. Lookups suffixed `_draft_aware` prefer the
//! draft twin when one exists.

mod courses;
mod drafts;
mod editors;
mod geo;
mod programs;
mod reference;
mod runs;
mod schema;
mod seed;
mod types;


pub use courses::NewCourse;
pub use programs::NewProgram;
pub use runs::NewCourseRun;
pub use seed::{SeedCourse, SeedData, SeedStats};
pub use types::*;

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::workspace::Workspace;
use crate::sync::search::IndexSignals;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Errors raised by the catalog store
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("catalog schema version {found} does not match expected version {expected}")]
    SchemaMismatch { found: i32, expected: i32 },
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CatalogError::Integrity(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => CatalogError::Sqlite(err),
        }
    }
}

impl CatalogError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        CatalogError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, CatalogError::Integrity(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// The catalog store
pub struct Catalog {
    conn: Connection,
    signals: IndexSignals,
}

impl Catalog {
    /// Open or create the catalog at a path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Invalid(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// Open the catalog of a workspace
    pub fn open_workspace(workspace: &Workspace) -> Result<Self> {
        Self::open(&workspace.database_path())
    }

    /// Open a throwaway in-memory catalog
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let catalog = Self {
            conn,
            signals: IndexSignals::new(),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Save/delete receivers for the search index
    pub fn signals(&self) -> &IndexSignals {
        &self.signals
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a savepoint. The savepoint is released when `f` returns
    /// `Ok` and rolled back when it returns `Err`, together with any index
    /// requests `f` deferred. The outer result only carries failures of the
    /// savepoint statements themselves.
    pub fn with_savepoint<T, E>(
        &self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<std::result::Result<T, E>> {
        self.conn.execute_batch("SAVEPOINT catalog_row")?;
        let mark = self.signals.mark();
        match f() {
            Ok(value) => {
                self.conn.execute_batch("RELEASE SAVEPOINT catalog_row")?;
                Ok(Ok(value))
            }
            Err(err) => {
                self.conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT catalog_row; RELEASE SAVEPOINT catalog_row",
                )?;
                self.signals.rollback_to(mark);
                Ok(Err(err))
            }
        }
    }

    /// Notify the index receivers that an entity was saved or deleted
    pub(crate) fn touch(&self, kind: IndexedKind, uuid: &str) -> Result<()> {
        self.signals.saved(&self.conn, kind, uuid)?;
        Ok(())
    }

    /// Record a call addressed to a collaborator running in local mode
    pub fn record_outbox(
        &self,
        channel: &str,
        action: &str,
        target: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO outbox (channel, action, target, payload, created) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![channel, action, target, payload.to_string(), now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Outbox entries for a channel, oldest first, as `(action, target, payload)`
    pub fn outbox_entries(&self, channel: &str) -> Result<Vec<(String, String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT action, target, payload FROM outbox WHERE channel = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![channel], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Store downloaded image bytes; returns the content hash
    pub fn store_image(
        &self,
        source_url: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String> {
        let hash = format!("{:x}", Sha256::digest(bytes));
        self.conn.execute(
            "INSERT INTO images (hash, source_url, content_type, byte_len, data, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(hash) DO UPDATE SET source_url = excluded.source_url",
            params![hash, source_url, content_type, bytes.len() as i64, bytes, now()],
        )?;
        Ok(hash)
    }

    /// Byte length of a stored image
    pub fn image_len(&self, hash: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT byte_len FROM images WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Stored image as `(content_type, bytes)`
    pub fn image_data(&self, hash: &str) -> Result<Option<(Option<String>, Vec<u8>)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT content_type, data FROM images WHERE hash = ?1",
                params![hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    /// Count rows of a table; used by reports and tests
    pub fn count(&self, table: &str) -> Result<i64> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CatalogError::Invalid(format!("bad table name: {}", table)));
        }
        Ok(self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?)
    }
}

/// Current time in the canonical catalog format
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Comma-joined column list for copy statements
pub(super) fn column_list(columns: &[&str]) -> String {
    columns.join(", ")
}
