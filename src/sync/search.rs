//! Search-index invalidation
//!
//! Every save of an indexable entity asks the indexer to refresh it by
//! appending to `index_queue`. Bulk ingestion disconnects that receiver for
//! the length of a run through [`IndexSuppression`]; entities saved while
//! disconnected are remembered and flushed as one batch when the guard drops.
//! Entities first remembered inside a savepoint that rolls back are forgotten
//! again, so a failed row never reaches the queue.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::core::catalog::{now, Catalog, IndexedKind};

/// Save/delete receivers feeding the search index queue
#[derive(Debug)]
pub struct IndexSignals {
    enabled: Cell<bool>,
    connected: Cell<bool>,
    pending: RefCell<BTreeSet<(IndexedKind, String)>>,
    /// Entries of `pending` in the order they were first added
    journal: RefCell<Vec<(IndexedKind, String)>>,
}

impl Default for IndexSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexSignals {
    pub fn new() -> Self {
        Self {
            enabled: Cell::new(true),
            connected: Cell::new(true),
            pending: RefCell::new(BTreeSet::new()),
            journal: RefCell::new(Vec::new()),
        }
    }

    /// Turn the index off entirely (no queue writes at all)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Entities saved while disconnected
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn saved(
        &self,
        conn: &Connection,
        kind: IndexedKind,
        uuid: &str,
    ) -> rusqlite::Result<()> {
        if !self.enabled.get() {
            return Ok(());
        }
        if self.connected.get() {
            enqueue(conn, kind, uuid, None)?;
        } else {
            let entry = (kind, uuid.to_string());
            if self.pending.borrow_mut().insert(entry.clone()) {
                self.journal.borrow_mut().push(entry);
            }
        }
        Ok(())
    }

    /// Position to return to if the enclosing savepoint rolls back
    pub(crate) fn mark(&self) -> usize {
        self.journal.borrow().len()
    }

    /// Forget entities first remembered after `mark`
    pub(crate) fn rollback_to(&self, mark: usize) {
        let mut journal = self.journal.borrow_mut();
        if mark >= journal.len() {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        for entry in journal.drain(mark..) {
            pending.remove(&entry);
        }
    }

    fn disconnect(&self) -> bool {
        self.connected.replace(false)
    }

    fn reconnect(&self, conn: &Connection, batch: &str) -> rusqlite::Result<usize> {
        self.connected.set(true);
        self.journal.borrow_mut().clear();
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if !self.enabled.get() {
            return Ok(0);
        }
        for (kind, uuid) in &pending {
            enqueue(conn, *kind, uuid, Some(batch))?;
        }
        Ok(pending.len())
    }
}

fn enqueue(
    conn: &Connection,
    kind: IndexedKind,
    uuid: &str,
    batch: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO index_queue (entity_kind, entity_uuid, batch, requested_at) VALUES (?1, ?2, ?3, ?4)",
        params![kind.as_str(), uuid, batch, now()],
    )?;
    Ok(())
}

/// Scope during which index receivers stay disconnected.
///
/// Receivers are reconnected on drop, on every exit path, but only if they
/// were connected when the scope was entered. Nested scopes therefore leave
/// the outermost one in charge of the flush.
pub struct IndexSuppression<'a> {
    catalog: &'a Catalog,
    batch: String,
    was_connected: bool,
}

impl<'a> IndexSuppression<'a> {
    pub fn new(catalog: &'a Catalog, batch: impl Into<String>) -> Self {
        let was_connected = catalog.signals().disconnect();
        let batch = batch.into();
        debug!(batch = %batch, "search index receivers disconnected");
        Self {
            catalog,
            batch,
            was_connected,
        }
    }
}

impl Drop for IndexSuppression<'_> {
    fn drop(&mut self) {
        if !self.was_connected {
            return;
        }
        match self
            .catalog
            .signals()
            .reconnect(self.catalog.conn(), &self.batch)
        {
            Ok(flushed) => debug!(batch = %self.batch, flushed, "search index receivers reconnected"),
            Err(e) => warn!(batch = %self.batch, error = %e, "failed to flush search index requests"),
        }
    }
}

/// A queued re-index request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub kind: String,
    pub uuid: String,
    pub batch: Option<String>,
}

/// Queued requests, oldest first
pub fn queued_requests(catalog: &Catalog) -> rusqlite::Result<Vec<IndexRequest>> {
    let mut stmt = catalog
        .conn()
        .prepare("SELECT entity_kind, entity_uuid, batch FROM index_queue ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(IndexRequest {
                kind: row.get(0)?,
                uuid: row.get(1)?,
                batch: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::SeedData;

    fn catalog_with_partner() -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        let seed = SeedData::from_yaml(
            "partners:\n  - short_code: edx\n    name: edX\ncollaborators:\n  - Acme\n",
        )
        .unwrap();
        catalog.apply_seed(&seed).unwrap();
        catalog
    }

    #[test]
    fn test_saves_enqueue_while_connected() {
        let catalog = catalog_with_partner();
        catalog
            .signals()
            .saved(catalog.conn(), IndexedKind::Course, "abc")
            .unwrap();

        let queued = queued_requests(&catalog).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, "course");
        assert_eq!(queued[0].batch, None);
    }

    #[test]
    fn test_suppression_defers_and_dedups() {
        let catalog = catalog_with_partner();
        let before = queued_requests(&catalog).unwrap().len();
        {
            let _guard = IndexSuppression::new(&catalog, "RUN-1");
            assert!(!catalog.signals().is_connected());
            for _ in 0..3 {
                catalog
                    .signals()
                    .saved(catalog.conn(), IndexedKind::CourseRun, "run-1")
                    .unwrap();
            }
            assert_eq!(queued_requests(&catalog).unwrap().len(), before);
            assert_eq!(catalog.signals().pending_count(), 1);
        }
        assert!(catalog.signals().is_connected());

        let queued = queued_requests(&catalog).unwrap();
        assert_eq!(queued.len(), before + 1);
        assert_eq!(queued.last().unwrap().batch.as_deref(), Some("RUN-1"));
    }

    #[test]
    fn test_rolled_back_row_is_not_flushed() {
        let catalog = catalog_with_partner();
        let before = queued_requests(&catalog).unwrap().len();
        {
            let _guard = IndexSuppression::new(&catalog, "RUN-2");
            catalog
                .signals()
                .saved(catalog.conn(), IndexedKind::Course, "kept")
                .unwrap();
            let failed: Result<(), &str> = catalog
                .with_savepoint(|| {
                    for uuid in ["kept", "failed"] {
                        catalog
                            .signals()
                            .saved(catalog.conn(), IndexedKind::Course, uuid)
                            .unwrap();
                    }
                    Err("row failed")
                })
                .unwrap();
            assert!(failed.is_err());
            assert_eq!(catalog.signals().pending_count(), 1);
        }

        let queued = queued_requests(&catalog).unwrap();
        assert_eq!(queued.len(), before + 1);
        assert_eq!(queued.last().unwrap().uuid, "kept");
    }

    #[test]
    fn test_nested_suppression_keeps_outer_scope_in_charge() {
        let catalog = catalog_with_partner();
        let _outer = IndexSuppression::new(&catalog, "outer");
        {
            let _inner = IndexSuppression::new(&catalog, "inner");
        }
        assert!(!catalog.signals().is_connected());
    }

    #[test]
    fn test_disabled_index_writes_nothing() {
        let catalog = catalog_with_partner();
        catalog.signals().set_enabled(false);
        let before = queued_requests(&catalog).unwrap().len();
        catalog
            .signals()
            .saved(catalog.conn(), IndexedKind::Program, "p")
            .unwrap();
        assert_eq!(queued_requests(&catalog).unwrap().len(), before);
    }
}
