//! Lock-acquisition helpers.
//!
//! A poisoned lock means a writer panicked mid-mutation; that surfaces as
//! an internal error instead of propagating the panic.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use mirage_core::{EngineError, Result};

/// Acquires a shared read guard.
pub fn read_guard<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| EngineError::internal(format!("lock poisoned: {e}")))
}

/// Acquires an exclusive write guard.
pub fn write_guard<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| EngineError::internal(format!("lock poisoned: {e}")))
}
