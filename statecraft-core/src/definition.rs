//! State machine definition types.
//!
//! A definition is built from its raw document form and validated once:
//!
//! ```yaml
//! state_machine:
//!   name: order_workflow
//!   model: Order
//!   field: status
//!   states: [draft, pending, approved, rejected]
//!   initial: draft
//!   transitions:
//!     - from: draft
//!       to: pending
//!       guard: CanSubmit
//!       action: NotifyReviewer
//!     - from: pending
//!       to: approved
//!       guard:
//!         and: [IsManager, {not: IsBlacklisted}]
//!     - from: pending
//!       to: rejected
//! ```
//!
//! After construction a [`Definition`] never changes and is shared behind an
//! `Arc` by every engine that runs it.

use crate::error::CoreError;
use crate::guard::GuardSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Default name of the field holding a subject's state.
pub const DEFAULT_STATE_FIELD: &str = "state";

/// A transition as written in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRaw {
    pub from: String,

    pub to: String,

    /// Guard in document form; parsed during definition construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Raw definition as written in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRaw {
    pub name: String,

    /// Subject type identifier.
    #[serde(alias = "subject_type")]
    pub model: String,

    /// State field; the loader fills in its configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub states: Vec<String>,

    pub initial: String,

    #[serde(default)]
    pub transitions: Vec<TransitionRaw>,
}

/// A validated transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,

    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
            action: None,
        }
    }

    pub fn with_guard(mut self, guard: GuardSpec) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Human-readable label, `from -> to`.
    pub fn label(&self) -> String {
        format!("{} -> {}", self.from, self.to)
    }

    /// Guard in string form (identifier or compact JSON).
    pub fn guard_label(&self) -> Option<String> {
        self.guard.as_ref().map(GuardSpec::to_string)
    }

    fn to_raw(&self) -> TransitionRaw {
        TransitionRaw {
            from: self.from.clone(),
            to: self.to.clone(),
            guard: self.guard.as_ref().map(GuardSpec::to_value),
            action: self.action.clone(),
        }
    }
}

/// Validated, immutable state machine definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    name: String,
    subject_type: String,
    state_field: String,
    states: Vec<String>,
    initial: String,
    transitions: Vec<Transition>,
    checksum: String,
}

impl Definition {
    /// Builds and validates a definition.
    pub fn new(
        name: impl Into<String>,
        subject_type: impl Into<String>,
        state_field: impl Into<String>,
        states: Vec<String>,
        initial: impl Into<String>,
        transitions: Vec<Transition>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let subject_type = subject_type.into();
        let state_field = state_field.into();
        let initial = initial.into();

        if states.is_empty() {
            return Err(CoreError::invalid(format!(
                "state machine '{}' declares no states",
                name
            )));
        }

        // Build state set
        let mut seen = HashSet::with_capacity(states.len());
        for state in &states {
            if !seen.insert(state.as_str()) {
                return Err(CoreError::invalid(format!(
                    "duplicate state '{}' in states list",
                    state
                )));
            }
        }

        // Validate initial state
        if !seen.contains(initial.as_str()) {
            return Err(CoreError::invalid(format!(
                "initial state '{}' not found in states list",
                initial
            )));
        }

        // Validate transitions
        for (index, t) in transitions.iter().enumerate() {
            if !seen.contains(t.from.as_str()) {
                return Err(CoreError::invalid(format!(
                    "transition #{}: 'from' state '{}' is not defined",
                    index, t.from
                )));
            }
            if !seen.contains(t.to.as_str()) {
                return Err(CoreError::invalid(format!(
                    "transition #{}: 'to' state '{}' is not defined",
                    index, t.to
                )));
            }
        }

        let mut definition = Self {
            name,
            subject_type,
            state_field,
            states,
            initial,
            transitions,
            checksum: String::new(),
        };

        // Compute checksum
        let json_bytes = serde_json::to_vec(&definition.to_raw())?;
        definition.checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(definition)
    }

    /// Creates a definition from its raw parts.
    ///
    /// `default_field` is used when the document does not name a state field.
    pub fn from_raw(raw: DefinitionRaw, default_field: &str) -> Result<Self, CoreError> {
        let mut transitions = Vec::with_capacity(raw.transitions.len());
        for t in raw.transitions {
            // Parse guard if present
            let guard = match &t.guard {
                Some(Value::Null) | None => None,
                Some(value) => Some(GuardSpec::from_value(value)?),
            };
            transitions.push(Transition {
                from: t.from,
                to: t.to,
                guard,
                action: t.action,
            });
        }

        Self::new(
            raw.name,
            raw.model,
            raw.field.unwrap_or_else(|| default_field.to_string()),
            raw.states,
            raw.initial,
            transitions,
        )
    }

    /// Parses and validates a definition from its JSON form.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let raw: DefinitionRaw = serde_json::from_value(json.clone())
            .map_err(|e| CoreError::invalid(e.to_string()))?;
        Self::from_raw(raw, DEFAULT_STATE_FIELD)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subject type identifier (`model` in documents).
    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn state_field(&self) -> &str {
        &self.state_field
    }

    /// States in declaration order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// CRC32C of the canonical JSON form.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Returns true if the given state is declared.
    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }

    /// Looks up the first transition declared for `from -> to`.
    pub fn transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from == from && t.to == to)
    }

    /// Returns true if a `from -> to` transition is declared.
    pub fn is_transition_valid(&self, from: &str, to: &str) -> bool {
        self.transition(from, to).is_some()
    }

    /// Returns transitions leaving `state`, in declaration order.
    pub fn transitions_from<'a>(&'a self, state: &str) -> Vec<&'a Transition> {
        self.transitions.iter().filter(|t| t.from == state).collect()
    }

    /// Distinct guard identifiers referenced anywhere, in first-use order.
    pub fn guard_identifiers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for guard in self.transitions.iter().filter_map(|t| t.guard.as_ref()) {
            for id in guard.identifiers() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Distinct action identifiers, in first-use order.
    pub fn action_identifiers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for id in self.transitions.iter().filter_map(|t| t.action.as_deref()) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    /// Returns the raw document form.
    pub fn to_raw(&self) -> DefinitionRaw {
        DefinitionRaw {
            name: self.name.clone(),
            model: self.subject_type.clone(),
            field: Some(self.state_field.clone()),
            states: self.states.clone(),
            initial: self.initial.clone(),
            transitions: self.transitions.iter().map(Transition::to_raw).collect(),
        }
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<Value, CoreError> {
        Ok(serde_json::to_value(self.to_raw())?)
    }
}
