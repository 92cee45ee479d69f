//! Named locks handed out by a directory

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// Set of lock names currently held within one directory
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock `name`, failing with `LockHeld` if someone else has it
    pub fn acquire(&self, name: &str) -> Result<EntryLock> {
        if !self.held.lock().insert(name.to_string()) {
            return Err(StoreError::LockHeld(name.to_string()));
        }
        Ok(EntryLock {
            name: name.to_string(),
            table: Some(self.clone()),
        })
    }

    #[must_use]
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }

    fn release(&self, name: &str) {
        self.held.lock().remove(name);
    }
}

/// A held lock; dropping it releases the name
#[derive(Debug)]
pub struct EntryLock {
    name: String,
    table: Option<LockTable>,
}

impl EntryLock {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release explicitly
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(table) = self.table.take() {
            table.release(&self.name);
        }
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}
