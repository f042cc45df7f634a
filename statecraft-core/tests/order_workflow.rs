//! End-to-end scenarios over the order approval workflow.

use parking_lot::Mutex;
use serde_json::{json, Map};
use statecraft_core::testing::{assert_available_transitions, assert_in_state};
use statecraft_core::{
    BoxError, ComponentRegistry, CoreError, DefinitionLoader, EngineConfig, EventBus,
    EventFilter, EventKind, HistoryRecord, HistoryStore, MemorySubject, Subject,
    TransitionEngine,
};
use std::sync::Arc;
use tempfile::TempDir;

const ORDER_WORKFLOW: &str = r#"
state_machine:
  name: order_workflow
  model: Order
  field: status
  states: [draft, pending, approved, rejected]
  initial: draft
  transitions:
    - from: draft
      to: pending
      guard: HasItems
      action: NotifyReviewer
    - from: pending
      to: approved
      guard:
        and: [IsManager, {not: IsBlacklisted}]
    - from: pending
      to: rejected
      guard: IsManager || IsAuditor
    - from: rejected
      to: draft
"#;

#[derive(Default)]
struct VecHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistoryStore for VecHistory {
    fn append(&self, record: HistoryRecord) -> Result<(), CoreError> {
        self.records.lock().push(record);
        Ok(())
    }

    fn records_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| r.is_for(subject_type, subject_id))
            .cloned()
            .collect())
    }
}

fn registry(notified: Arc<Mutex<Vec<String>>>) -> Arc<ComponentRegistry> {
    let registry = ComponentRegistry::new();
    registry.register_guard_fn("guards::HasItems", |s, _, _| {
        s.get_field("items")
            .and_then(|v| v.as_u64())
            .map(|n| n > 0)
            .unwrap_or(false)
    });
    registry.register_guard_fn("IsManager", |s, _, _| {
        s.get_field("role") == Some(json!("manager"))
    });
    registry.register_guard_fn("IsAuditor", |s, _, _| {
        s.get_field("role") == Some(json!("auditor"))
    });
    registry.register_guard_fn("IsBlacklisted", |s, _, _| {
        s.get_field("blacklisted") == Some(json!(true))
    });
    registry.register_action_fn("NotifyReviewer", move |s, from, to| {
        let id = s.subject_id().unwrap_or_default();
        notified.lock().push(format!("{}:{}->{}", id, from, to));
        Ok(())
    });
    Arc::new(registry)
}

fn engine_with(config: EngineConfig, bus: Arc<EventBus>) -> (TransitionEngine, Arc<Mutex<Vec<String>>>) {
    let notified = Arc::new(Mutex::new(Vec::new()));
    let definition = DefinitionLoader::new(".")
        .load_str(ORDER_WORKFLOW, "order_workflow")
        .unwrap();
    let engine = TransitionEngine::new(Arc::new(definition), registry(notified.clone()))
        .with_config(config)
        .with_bus(bus);
    (engine, notified)
}

#[test]
fn order_moves_through_approval() {
    let bus = Arc::new(EventBus::new());
    let (engine, notified) = engine_with(EngineConfig::default(), bus.clone());
    let history = Arc::new(VecHistory::default());
    let mut order = MemorySubject::new("Order")
        .with_id("42")
        .with_field("items", json!(3))
        .with_field("role", json!("manager"))
        .with_history(history.clone());

    assert_in_state(&engine, &order, "draft");
    assert_available_transitions(&engine, &order, &["pending"]);

    let outcome = engine.transition(&mut order, "pending").unwrap();
    assert_eq!(outcome.guard.as_deref(), Some("HasItems"));
    assert_eq!(*notified.lock(), vec!["42:draft->pending".to_string()]);
    assert_available_transitions(&engine, &order, &["approved", "rejected"]);

    let mut metadata = Map::new();
    metadata.insert("approved_by".into(), json!("alice"));
    engine.transition_with(&mut order, "approved", metadata).unwrap();

    assert_eq!(order.persisted().get("status"), Some(&json!("approved")));
    assert_eq!(order.save_count(), 2);

    let records = order.history().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].transition.as_deref(), Some("draft -> pending"));
    assert_eq!(records[0].action.as_deref(), Some("NotifyReviewer"));
    assert_eq!(
        records[1].guard.as_deref(),
        Some(r#"{"and":["IsManager",{"not":"IsBlacklisted"}]}"#)
    );
    assert_eq!(records[1].metadata["approved_by"], "alice");
    assert_eq!(
        order.latest_transition().unwrap().unwrap().to_state,
        "approved"
    );
}

#[test]
fn blacklisted_order_can_only_be_rejected() {
    let (engine, _) = engine_with(EngineConfig::default(), Arc::new(EventBus::new()));
    let mut order = MemorySubject::new("Order")
        .with_id("7")
        .with_field("status", json!("pending"))
        .with_field("role", json!("manager"))
        .with_field("blacklisted", json!(true));

    let err = engine.transition(&mut order, "approved").unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(order.get_field("status"), Some(json!("pending")));
    assert_eq!(order.save_count(), 0);

    engine.transition(&mut order, "rejected").unwrap();
    engine.transition(&mut order, "draft").unwrap();
    assert_in_state(&engine, &order, "draft");
}

#[test]
fn empty_order_cannot_be_submitted() {
    let (engine, notified) = engine_with(EngineConfig::default(), Arc::new(EventBus::new()));
    let mut order = MemorySubject::new("Order").with_field("items", json!(0));

    assert!(!engine.can_transition(&order, "pending").unwrap());
    assert!(matches!(
        engine.transition(&mut order, "pending").unwrap_err(),
        CoreError::InvalidTransition { .. }
    ));
    assert!(notified.lock().is_empty());
    assert!(order.get_field("status").is_none());
}

#[test]
fn notifications_are_published_once_per_phase() {
    let bus = Arc::new(EventBus::new());
    let (engine, _) = engine_with(EngineConfig::default(), bus.clone());
    let (_id, rx) = bus.subscribe_channel(EventFilter::default());

    let mut order = MemorySubject::new("Order").with_field("items", json!(1));
    engine.transition(&mut order, "pending").unwrap();

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Transitioning);
    assert_eq!(events[1].kind, EventKind::Transitioned);
    assert_eq!(events[1].state_machine, "order_workflow");
    assert_eq!(events[1].action.as_deref(), Some("NotifyReviewer"));
}

#[test]
fn notifications_disabled_by_config() {
    let bus = Arc::new(EventBus::new());
    let mut config = EngineConfig::default();
    config.events.enabled = false;
    let (engine, _) = engine_with(config, bus.clone());
    let (_id, rx) = bus.subscribe_channel(EventFilter::default());

    let mut order = MemorySubject::new("Order").with_field("items", json!(1));
    engine.transition(&mut order, "pending").unwrap();

    assert_eq!(rx.try_iter().count(), 0);
}

#[test]
fn rejected_transition_publishes_nothing() {
    let bus = Arc::new(EventBus::new());
    let (engine, _) = engine_with(EngineConfig::default(), bus.clone());
    let (_id, rx) = bus.subscribe_channel(EventFilter::default());

    let mut order = MemorySubject::new("Order");
    assert!(engine.transition(&mut order, "approved").is_err());
    assert_eq!(rx.try_iter().count(), 0);
}

#[test]
fn history_disabled_by_config() {
    let mut config = EngineConfig::default();
    config.history.enabled = false;
    let (engine, _) = engine_with(config, Arc::new(EventBus::new()));
    let history = Arc::new(VecHistory::default());
    let mut order = MemorySubject::new("Order")
        .with_id("1")
        .with_field("items", json!(1))
        .with_history(history.clone());

    engine.transition(&mut order, "pending").unwrap();
    assert!(history.records.lock().is_empty());
}

struct FailingHistory;

impl HistoryStore for FailingHistory {
    fn append(&self, _record: HistoryRecord) -> Result<(), CoreError> {
        Err(CoreError::HistoryFailed(BoxError::from("store offline")))
    }

    fn records_for(&self, _: &str, _: &str) -> Result<Vec<HistoryRecord>, CoreError> {
        Ok(Vec::new())
    }
}

#[test]
fn history_failure_surfaces_after_save() {
    let (engine, _) = engine_with(EngineConfig::default(), Arc::new(EventBus::new()));
    let mut order = MemorySubject::new("Order")
        .with_id("1")
        .with_field("items", json!(1))
        .with_history(Arc::new(FailingHistory));

    let err = engine.transition(&mut order, "pending").unwrap_err();
    assert_eq!(err.error_code(), "HISTORY_FAILED");
    assert_eq!(order.persisted().get("status"), Some(&json!("pending")));
}

#[test]
fn definitions_load_from_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("order_workflow.yaml"), ORDER_WORKFLOW).unwrap();
    std::fs::write(
        dir.path().join("broken.yml"),
        "state_machine:\n  name: broken\n  model: Order\n  states: [a]\n",
    )
    .unwrap();

    let loader = DefinitionLoader::new(dir.path());
    let definition = loader.load("order_workflow").unwrap();
    assert_eq!(definition.state_field(), "status");

    let err = loader.load("broken").unwrap_err();
    assert!(matches!(&err, CoreError::DefinitionInvalid { reason } if reason.contains("initial")));
    assert!(loader.load_all().is_err());
}
