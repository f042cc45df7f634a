//! Transition engine - runs one definition against subjects.

use crate::config::EngineConfig;
use crate::definition::{Definition, Transition};
use crate::error::CoreError;
use crate::event::{EventKind, NotificationBus, TransitionEvent};
use crate::guard::GuardEvaluator;
use crate::history::HistoryRecord;
use crate::resolver::Resolver;
use crate::subject::Subject;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: String,
    pub to: String,
    /// Guard in string form.
    pub guard: Option<String>,
    pub action: Option<String>,
}

/// Executes transitions of a single definition.
///
/// The engine keeps no per-subject state; every call re-reads the subject's
/// state field.
pub struct TransitionEngine {
    definition: Arc<Definition>,
    resolver: Arc<dyn Resolver>,
    bus: Option<Arc<dyn NotificationBus>>,
    config: EngineConfig,
    /// verb -> target state
    verbs: BTreeMap<String, String>,
}

impl TransitionEngine {
    pub fn new(definition: Arc<Definition>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            definition,
            resolver,
            bus: None,
            config: EngineConfig::default(),
            verbs: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches a notification bus. Publishing still honours `events.enabled`.
    pub fn with_bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Registers a named verb moving subjects to `target`.
    pub fn with_verb(
        mut self,
        verb: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let verb = verb.into();
        let target = target.into();
        if !self.definition.has_state(&target) {
            return Err(CoreError::invalid(format!(
                "verb '{}' targets undeclared state '{}'",
                verb, target
            )));
        }
        self.verbs.insert(verb, target);
        Ok(self)
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered verbs and their target states, sorted by verb.
    pub fn verbs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.verbs.iter().map(|(v, t)| (v.as_str(), t.as_str()))
    }

    /// Returns the subject's state, or the initial state when the field is empty.
    ///
    /// Never writes to the subject.
    pub fn current_state(&self, subject: &dyn Subject) -> String {
        match subject.get_field(self.definition.state_field()) {
            Some(Value::String(s)) if !s.is_empty() => s,
            None | Some(Value::Null) | Some(Value::String(_)) => {
                self.definition.initial().to_string()
            }
            Some(other) => other.to_string(),
        }
    }

    /// Returns whether the subject may move to `to` right now.
    pub fn can_transition(&self, subject: &dyn Subject, to: &str) -> Result<bool, CoreError> {
        let from = self.current_state(subject);
        match self.definition.transition(&from, to) {
            Some(transition) => self.guard_passes(transition, subject),
            None => Ok(false),
        }
    }

    /// Moves the subject to `to`.
    pub fn transition(
        &self,
        subject: &mut dyn Subject,
        to: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        self.transition_with(subject, to, Map::new())
    }

    /// Moves the subject to `to`, attaching `metadata` to the history record.
    ///
    /// Steps, in order: guard check, `Transitioning` notification, action,
    /// field write and save, history, `Transitioned` notification. A failing
    /// action aborts before the field is written.
    pub fn transition_with(
        &self,
        subject: &mut dyn Subject,
        to: &str,
        metadata: Map<String, Value>,
    ) -> Result<TransitionOutcome, CoreError> {
        let from = self.current_state(subject);
        let machine = self.definition.name();

        let transition = match self.definition.transition(&from, to) {
            Some(t) => t,
            None => return Err(self.reject(from, to)),
        };
        if !self.guard_passes(transition, subject)? {
            return Err(self.reject(from, to));
        }

        let outcome = TransitionOutcome {
            from: from.clone(),
            to: to.to_string(),
            guard: transition.guard_label(),
            action: transition.action.clone(),
        };

        self.publish(EventKind::Transitioning, subject, &outcome);

        // Run action
        if let Some(action_id) = &transition.action {
            let action = self.resolver.resolve_action(action_id)?;
            tracing::debug!(machine, action = %action_id, "executing action");
            action
                .execute(subject, &from, to)
                .map_err(|source| CoreError::ActionFailed {
                    action: action_id.clone(),
                    source,
                })?;
        }

        // Write state and save
        subject.set_field(
            self.definition.state_field(),
            Value::String(to.to_string()),
        );
        subject.save().map_err(CoreError::SaveFailed)?;

        if self.config.history.enabled {
            self.record_history(subject, &outcome, metadata)?;
        }

        self.publish(EventKind::Transitioned, subject, &outcome);

        tracing::info!(
            machine,
            subject_type = subject.subject_type(),
            subject_id = subject.subject_id().as_deref().unwrap_or("-"),
            from = %outcome.from,
            to = %outcome.to,
            "transition complete"
        );
        Ok(outcome)
    }

    /// Transitions leaving the current state whose guards pass, in declaration order.
    pub fn available_transitions(
        &self,
        subject: &dyn Subject,
    ) -> Result<Vec<&Transition>, CoreError> {
        let from = self.current_state(subject);
        let mut available = Vec::new();
        for transition in self.definition.transitions_from(&from) {
            if self.guard_passes(transition, subject)? {
                available.push(transition);
            }
        }
        Ok(available)
    }

    /// Writes the initial state into an empty state field.
    ///
    /// Does not save. Returns whether the field was written.
    pub fn initialize(&self, subject: &mut dyn Subject) -> bool {
        let empty = match subject.get_field(self.definition.state_field()) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if empty {
            subject.set_field(
                self.definition.state_field(),
                Value::String(self.definition.initial().to_string()),
            );
        }
        empty
    }

    /// Runs the transition registered under `verb`.
    pub fn apply(
        &self,
        subject: &mut dyn Subject,
        verb: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        let target = self.verb_target(verb)?;
        self.transition(subject, target)
    }

    /// Returns whether the transition registered under `verb` is currently allowed.
    pub fn can_apply(&self, subject: &dyn Subject, verb: &str) -> Result<bool, CoreError> {
        let target = self.verb_target(verb)?;
        self.can_transition(subject, target)
    }

    fn verb_target(&self, verb: &str) -> Result<&str, CoreError> {
        self.verbs
            .get(verb)
            .map(String::as_str)
            .ok_or_else(|| CoreError::UnknownVerb {
                machine: self.definition.name().to_string(),
                verb: verb.to_string(),
            })
    }

    fn reject(&self, from: String, to: &str) -> CoreError {
        tracing::debug!(machine = self.definition.name(), from = %from, to, "transition rejected");
        CoreError::InvalidTransition {
            from,
            to: to.to_string(),
        }
    }

    fn guard_passes(&self, transition: &Transition, subject: &dyn Subject) -> Result<bool, CoreError> {
        GuardEvaluator::new(self.resolver.as_ref()).evaluate_opt(
            transition.guard.as_ref(),
            subject,
            &transition.from,
            &transition.to,
        )
    }

    fn record_history(
        &self,
        subject: &mut dyn Subject,
        outcome: &TransitionOutcome,
        metadata: Map<String, Value>,
    ) -> Result<(), CoreError> {
        let record = HistoryRecord::new(
            subject.subject_type(),
            subject.subject_id(),
            self.definition.name(),
            Some(outcome.from.clone()),
            outcome.to.clone(),
        )
        .with_guard(outcome.guard.clone())
        .with_action(outcome.action.clone())
        .with_metadata(metadata);

        match subject.history_sink() {
            Some(sink) => {
                let record_id = record.id;
                sink.record_transition(record)
                    .map_err(CoreError::HistoryFailed)?;
                tracing::debug!(record_id = %record_id, "recorded transition history");
            }
            None => tracing::debug!("subject has no history sink, skipping history"),
        }
        Ok(())
    }

    fn publish(&self, kind: EventKind, subject: &dyn Subject, outcome: &TransitionOutcome) {
        if !self.config.events.enabled {
            return;
        }
        let Some(bus) = &self.bus else {
            return;
        };
        bus.publish(&TransitionEvent {
            kind,
            subject_type: subject.subject_type().to_string(),
            subject_id: subject.subject_id(),
            state_machine: self.definition.name().to_string(),
            from: outcome.from.clone(),
            to: outcome.to.clone(),
            guard: outcome.guard.clone(),
            action: outcome.action.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Transition;
    use crate::error::BoxError;
    use crate::guard::GuardSpec;
    use crate::resolver::ComponentRegistry;
    use crate::subject::MemorySubject;
    use serde_json::json;

    fn sample_definition() -> Arc<Definition> {
        Arc::new(
            Definition::new(
                "order_workflow",
                "Order",
                "state",
                vec!["draft".into(), "pending".into(), "approved".into()],
                "draft",
                vec![
                    Transition::new("draft", "pending").with_action("Stamp"),
                    Transition::new("pending", "approved")
                        .with_guard(GuardSpec::named("IsManager")),
                ],
            )
            .unwrap(),
        )
    }

    fn registry() -> Arc<ComponentRegistry> {
        let registry = ComponentRegistry::new();
        registry.register_guard_fn("IsManager", |s, _, _| {
            s.get_field("role") == Some(json!("manager"))
        });
        registry.register_action_fn("Stamp", |s, from, _| {
            s.set_field("stamped_from", json!(from));
            Ok(())
        });
        Arc::new(registry)
    }

    fn engine() -> TransitionEngine {
        TransitionEngine::new(sample_definition(), registry())
    }

    #[test]
    fn test_current_state_defaults_to_initial() {
        let engine = engine();
        let mut subject = MemorySubject::new("Order");
        assert_eq!(engine.current_state(&subject), "draft");

        subject.set_field("state", json!(""));
        assert_eq!(engine.current_state(&subject), "draft");
        subject.set_field("state", Value::Null);
        assert_eq!(engine.current_state(&subject), "draft");
        assert_eq!(subject.get_field("state"), Some(Value::Null));

        subject.set_field("state", json!("pending"));
        assert_eq!(engine.current_state(&subject), "pending");
    }

    #[test]
    fn test_initialize_only_when_empty() {
        let engine = engine();
        let mut subject = MemorySubject::new("Order");
        assert!(engine.initialize(&mut subject));
        assert_eq!(subject.get_field("state"), Some(json!("draft")));
        assert_eq!(subject.save_count(), 0);

        subject.set_field("state", json!("pending"));
        assert!(!engine.initialize(&mut subject));
        assert_eq!(subject.get_field("state"), Some(json!("pending")));
    }

    #[test]
    fn test_transition_runs_action_and_saves() {
        let engine = engine();
        let mut subject = MemorySubject::new("Order");

        let outcome = engine.transition(&mut subject, "pending").unwrap();
        assert_eq!(outcome.from, "draft");
        assert_eq!(outcome.action.as_deref(), Some("Stamp"));
        assert_eq!(subject.get_field("stamped_from"), Some(json!("draft")));
        assert_eq!(subject.persisted().get("state"), Some(&json!("pending")));
        assert_eq!(subject.save_count(), 1);
    }

    #[test]
    fn test_rejection_leaves_subject_untouched() {
        let engine = engine();
        let mut subject = MemorySubject::new("Order").with_field("state", json!("pending"));

        assert!(!engine.can_transition(&subject, "approved").unwrap());
        let err = engine.transition(&mut subject, "approved").unwrap_err();
        assert!(err.is_rejection());
        assert!(matches!(err, CoreError::InvalidTransition { ref from, ref to } if from == "pending" && to == "approved"));

        let err = engine.transition(&mut subject, "draft").unwrap_err();
        assert!(err.is_rejection());

        assert_eq!(subject.get_field("state"), Some(json!("pending")));
        assert_eq!(subject.save_count(), 0);
    }

    #[test]
    fn test_action_failure_keeps_state() {
        let registry = ComponentRegistry::new();
        registry.register_action_fn("Stamp", |_, _, _| Err(BoxError::from("ledger offline")));
        let engine = TransitionEngine::new(sample_definition(), Arc::new(registry));
        let mut subject = MemorySubject::new("Order");

        let err = engine.transition(&mut subject, "pending").unwrap_err();
        assert!(matches!(err, CoreError::ActionFailed { ref action, .. } if action == "Stamp"));
        assert_eq!(subject.get_field("state"), None);
        assert_eq!(subject.save_count(), 0);
    }

    #[test]
    fn test_unresolved_guard_propagates() {
        let engine = TransitionEngine::new(sample_definition(), Arc::new(ComponentRegistry::new()));
        let subject = MemorySubject::new("Order").with_field("state", json!("pending"));
        assert!(matches!(
            engine.can_transition(&subject, "approved").unwrap_err(),
            CoreError::UnresolvedGuard { .. }
        ));
    }

    struct FailingSave;

    impl Subject for FailingSave {
        fn subject_type(&self) -> &str {
            "Order"
        }

        fn get_field(&self, _name: &str) -> Option<Value> {
            None
        }

        fn set_field(&mut self, _name: &str, _value: Value) {}

        fn save(&mut self) -> Result<(), BoxError> {
            Err("disk full".into())
        }
    }

    #[test]
    fn test_save_failure() {
        let engine = TransitionEngine::new(sample_definition(), registry());
        let err = engine.transition(&mut FailingSave, "pending").unwrap_err();
        assert_eq!(err.error_code(), "SAVE_FAILED");
    }

    #[test]
    fn test_verbs() {
        let engine = engine()
            .with_verb("submit", "pending")
            .unwrap()
            .with_verb("approve", "approved")
            .unwrap();
        let mut subject = MemorySubject::new("Order");

        assert!(engine.can_apply(&subject, "submit").unwrap());
        assert!(!engine.can_apply(&subject, "approve").unwrap());
        engine.apply(&mut subject, "submit").unwrap();
        assert_eq!(subject.get_field("state"), Some(json!("pending")));

        assert!(matches!(
            engine.apply(&mut subject, "archive").unwrap_err(),
            CoreError::UnknownVerb { verb, .. } if verb == "archive"
        ));
        assert_eq!(
            engine.verbs().collect::<Vec<_>>(),
            vec![("approve", "approved"), ("submit", "pending")]
        );
    }

    #[test]
    fn test_verb_must_target_declared_state() {
        let err = engine().with_verb("archive", "archived").err().unwrap();
        assert!(matches!(err, CoreError::DefinitionInvalid { .. }));
    }

    #[test]
    fn test_available_transitions_filters_guards() {
        let engine = engine();
        let mut subject = MemorySubject::new("Order").with_field("state", json!("pending"));
        assert!(engine.available_transitions(&subject).unwrap().is_empty());

        subject.set_field("role", json!("manager"));
        let available = engine.available_transitions(&subject).unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].to, "approved");
    }
}
