//! Nested, savepoint-capable transactions over full-catalog snapshots.
//!
//! Each BEGIN pushes a frame holding a deep copy of the catalog; nested
//! BEGINs stack further frames. ROLLBACK reinstates the current frame's
//! snapshot, COMMIT just pops it. Savepoints are named snapshots inside
//! the current frame; rolling back to one discards every savepoint
//! created after it, the way MySQL does.

use std::sync::Mutex;

use mirage_core::{EngineError, Result};
use mirage_storage::{Database, Snapshot};

use crate::result::QueryResult;

struct Frame {
    snapshot: Snapshot,
    savepoints: Vec<(String, Snapshot)>,
}

/// The engine-wide transaction state: a stack of frames behind its own
/// lock.
#[derive(Default)]
pub struct TransactionManager {
    frames: Mutex<Vec<Frame>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth; 0 means idle.
    pub fn depth(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Frame>>> {
        self.frames
            .lock()
            .map_err(|e| EngineError::internal(format!("transaction lock poisoned: {e}")))
    }

    pub fn begin(&self, catalog: &Database) -> Result<QueryResult> {
        let snapshot = catalog.snapshot()?;
        let mut frames = self.lock()?;
        frames.push(Frame {
            snapshot,
            savepoints: Vec::new(),
        });
        let depth = frames.len();
        tracing::debug!(depth, "transaction started");
        Ok(QueryResult::status(if depth == 1 {
            "Transaction started".to_string()
        } else {
            format!("Nested transaction started (level {depth})")
        }))
    }

    pub fn commit(&self) -> Result<QueryResult> {
        let mut frames = self.lock()?;
        if frames.is_empty() {
            return Err(EngineError::txn("no transaction in progress"));
        }
        let depth = frames.len();
        frames.pop();
        tracing::debug!(depth, "transaction committed");
        Ok(QueryResult::status(if depth == 1 {
            "Transaction committed".to_string()
        } else {
            format!("Nested transaction committed (level {depth})")
        }))
    }

    pub fn rollback(&self, catalog: &Database) -> Result<QueryResult> {
        let mut frames = self.lock()?;
        let Some(frame) = frames.pop() else {
            return Err(EngineError::txn("no transaction in progress"));
        };
        let depth = frames.len() + 1;
        catalog.restore(frame.snapshot)?;
        tracing::debug!(depth, "transaction rolled back");
        Ok(QueryResult::status(if depth == 1 {
            "Transaction rolled back".to_string()
        } else {
            format!("Nested transaction rolled back (level {depth})")
        }))
    }

    pub fn savepoint(&self, catalog: &Database, name: &str) -> Result<QueryResult> {
        let snapshot = catalog.snapshot()?;
        let mut frames = self.lock()?;
        let Some(frame) = frames.last_mut() else {
            return Err(EngineError::txn("no transaction in progress"));
        };
        let key = name.to_lowercase();
        frame.savepoints.retain(|(existing, _)| *existing != key);
        frame.savepoints.push((key, snapshot));
        Ok(QueryResult::status(format!("Savepoint {name} created")))
    }

    pub fn rollback_to_savepoint(&self, catalog: &Database, name: &str) -> Result<QueryResult> {
        let mut frames = self.lock()?;
        let Some(frame) = frames.last_mut() else {
            return Err(EngineError::txn("no transaction in progress"));
        };
        let key = name.to_lowercase();
        let Some(position) = frame.savepoints.iter().position(|(n, _)| *n == key) else {
            return Err(EngineError::txn(format!("savepoint {name} does not exist")));
        };
        // Later savepoints die with the rollback; the target stays live
        // for repeated rollbacks.
        frame.savepoints.truncate(position + 1);
        let snapshot = frame.savepoints[position].1.clone();
        catalog.restore(snapshot)?;
        Ok(QueryResult::status(format!("Rolled back to savepoint {name}")))
    }

    pub fn release_savepoint(&self, name: &str) -> Result<QueryResult> {
        let mut frames = self.lock()?;
        let Some(frame) = frames.last_mut() else {
            return Err(EngineError::txn("no transaction in progress"));
        };
        let key = name.to_lowercase();
        let before = frame.savepoints.len();
        frame.savepoints.retain(|(n, _)| *n != key);
        if frame.savepoints.len() == before {
            return Err(EngineError::txn(format!("savepoint {name} does not exist")));
        }
        Ok(QueryResult::status(format!("Savepoint {name} released")))
    }
}
