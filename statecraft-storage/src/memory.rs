//! In-memory history store.

use parking_lot::RwLock;
use statecraft_core::{CoreError, HistoryRecord, HistoryStore};

/// Keeps history records in memory, in append order.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record, oldest first.
    pub fn all(&self) -> Vec<HistoryRecord> {
        self.records.read().clone()
    }

    /// Returns records written by the given state machine.
    pub fn records_for_machine(&self, state_machine: &str) -> Vec<HistoryRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.state_machine == state_machine)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: HistoryRecord) -> Result<(), CoreError> {
        self.records.write().push(record);
        Ok(())
    }

    fn records_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.is_for(subject_type, subject_id))
            .cloned()
            .collect())
    }

    fn latest_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<HistoryRecord>, CoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .find(|r| r.is_for(subject_type, subject_id))
            .cloned())
    }
}
