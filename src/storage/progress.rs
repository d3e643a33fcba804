//! In-memory progress counter store

use crate::storage::traits::{ProgressStore, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default)]
struct ProgressEntry {
    counter: f64,
    target: Option<u64>,
}

/// Process-local `ProgressStore`
///
/// Used when no external counter store is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, ProgressEntry>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> StorageResult<MutexGuard<'_, HashMap<String, ProgressEntry>>> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl ProgressStore for MemoryProgressStore {
    fn set_counter(&self, domain: &str, value: f64) -> StorageResult<()> {
        self.entries()?.entry(domain.to_string()).or_default().counter = value;
        Ok(())
    }

    fn increment_counter(&self, domain: &str, amount: f64) -> StorageResult<f64> {
        let mut entries = self.entries()?;
        let entry = entries.entry(domain.to_string()).or_default();
        entry.counter += amount;
        Ok(entry.counter)
    }

    fn get_counter(&self, domain: &str) -> StorageResult<f64> {
        Ok(self
            .entries()?
            .get(domain)
            .map(|e| e.counter)
            .unwrap_or(0.0))
    }

    fn set_target(&self, domain: &str, target: u64) -> StorageResult<()> {
        self.entries()?.entry(domain.to_string()).or_default().target = Some(target);
        Ok(())
    }

    fn get_target(&self, domain: &str) -> StorageResult<Option<u64>> {
        Ok(self.entries()?.get(domain).and_then(|e| e.target))
    }

    fn reset(&self, domain: &str) -> StorageResult<()> {
        self.set_counter(domain, 0.0)
    }
}
