//! Subjects: the entities whose state a machine governs.

use crate::error::{BoxError, CoreError};
use crate::history::{HistoryRecord, HistorySink, HistoryStore};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// An entity governed by a state machine.
///
/// The engine reads and writes the state through named fields and asks the
/// subject to save itself. Persistence of the subject belongs to the caller.
pub trait Subject {
    /// Type identifier, matched against a definition's subject type.
    fn subject_type(&self) -> &str;

    /// Stable identifier, if the subject has one yet.
    fn subject_id(&self) -> Option<String> {
        None
    }

    fn get_field(&self, name: &str) -> Option<Value>;

    fn set_field(&mut self, name: &str, value: Value);

    fn save(&mut self) -> Result<(), BoxError>;

    /// Returns the history capability, if the subject records its transitions.
    fn history_sink(&mut self) -> Option<&mut dyn HistorySink> {
        None
    }
}

/// In-memory subject backed by a JSON field map.
///
/// `save` snapshots the fields so callers can tell persisted from pending
/// values. When a [`HistoryStore`] is attached the subject also acts as a
/// [`HistorySink`].
#[derive(Clone)]
pub struct MemorySubject {
    subject_type: String,
    id: Option<String>,
    fields: Map<String, Value>,
    persisted: Map<String, Value>,
    save_count: usize,
    history: Option<Arc<dyn HistoryStore>>,
}

impl MemorySubject {
    pub fn new(subject_type: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            id: None,
            fields: Map::new(),
            persisted: Map::new(),
            save_count: 0,
            history: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_history(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Current (possibly unsaved) fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Fields as of the last save.
    pub fn persisted(&self) -> &Map<String, Value> {
        &self.persisted
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    /// Returns the recorded transitions of this subject, oldest first.
    pub fn history(&self) -> Result<Vec<HistoryRecord>, CoreError> {
        match (&self.history, &self.id) {
            (Some(store), Some(id)) => store.records_for(&self.subject_type, id),
            _ => Ok(Vec::new()),
        }
    }

    /// Returns the most recent recorded transition.
    pub fn latest_transition(&self) -> Result<Option<HistoryRecord>, CoreError> {
        match (&self.history, &self.id) {
            (Some(store), Some(id)) => store.latest_for(&self.subject_type, id),
            _ => Ok(None),
        }
    }
}

impl fmt::Debug for MemorySubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySubject")
            .field("subject_type", &self.subject_type)
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("save_count", &self.save_count)
            .field("history", &self.history.is_some())
            .finish()
    }
}

impl Subject for MemorySubject {
    fn subject_type(&self) -> &str {
        &self.subject_type
    }

    fn subject_id(&self) -> Option<String> {
        self.id.clone()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    fn save(&mut self) -> Result<(), BoxError> {
        self.persisted = self.fields.clone();
        self.save_count += 1;
        Ok(())
    }

    fn history_sink(&mut self) -> Option<&mut dyn HistorySink> {
        if self.history.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl HistorySink for MemorySubject {
    fn record_transition(&mut self, record: HistoryRecord) -> Result<(), BoxError> {
        match &self.history {
            Some(store) => store.append(record).map_err(BoxError::from),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_and_save_snapshot() {
        let mut subject = MemorySubject::new("Order").with_id("1");
        subject.set_field("state", json!("draft"));
        assert!(subject.persisted().is_empty());

        subject.save().unwrap();
        subject.set_field("state", json!("pending"));

        assert_eq!(subject.get_field("state"), Some(json!("pending")));
        assert_eq!(subject.persisted().get("state"), Some(&json!("draft")));
        assert_eq!(subject.save_count(), 1);
    }

    #[test]
    fn test_no_history_without_store() {
        let mut subject = MemorySubject::new("Order").with_id("1");
        assert!(subject.history_sink().is_none());
        assert!(subject.history().unwrap().is_empty());
        assert!(subject.latest_transition().unwrap().is_none());
    }
}
