//! Transition history records.

use crate::error::{BoxError, CoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Audit entry for one executed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique record ID.
    pub id: Uuid,

    /// Type identifier of the subject.
    pub subject_type: String,

    /// Subject ID, if the subject has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Name of the state machine that ran the transition.
    pub state_machine: String,

    /// Transition label (`from -> to`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,

    /// Source state. Absent for initial placement.
    pub from_state: Option<String>,

    /// Target state.
    pub to_state: String,

    /// Guard in string form.
    pub guard: Option<String>,

    /// Action identifier.
    pub action: Option<String>,

    /// Caller-supplied metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Creates a record for a `from -> to` move, stamped with the current time.
    pub fn new(
        subject_type: impl Into<String>,
        subject_id: Option<String>,
        state_machine: impl Into<String>,
        from_state: Option<String>,
        to_state: impl Into<String>,
    ) -> Self {
        let to_state = to_state.into();
        let transition = from_state
            .as_ref()
            .map(|from| format!("{} -> {}", from, to_state));

        Self {
            id: Uuid::new_v4(),
            subject_type: subject_type.into(),
            subject_id,
            state_machine: state_machine.into(),
            transition,
            from_state,
            to_state,
            guard: None,
            action: None,
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_guard(mut self, guard: Option<String>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_action(mut self, action: Option<String>) -> Self {
        self.action = action;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns true if this record belongs to the given subject.
    pub fn is_for(&self, subject_type: &str, subject_id: &str) -> bool {
        self.subject_type == subject_type && self.subject_id.as_deref() == Some(subject_id)
    }
}

/// Capability of a subject to record its own transitions.
pub trait HistorySink {
    fn record_transition(&mut self, record: HistoryRecord) -> Result<(), BoxError>;
}

/// Persistent store of history records.
pub trait HistoryStore: Send + Sync {
    /// Appends a record.
    fn append(&self, record: HistoryRecord) -> Result<(), CoreError>;

    /// Returns all records of a subject, oldest first.
    fn records_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<HistoryRecord>, CoreError>;

    /// Returns the most recent record of a subject.
    fn latest_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Option<HistoryRecord>, CoreError> {
        Ok(self.records_for(subject_type, subject_id)?.pop())
    }
}
