//! # statecraft-core
//!
//! Declarative state machine engine.
//!
//! This crate provides:
//! - Definition parsing and validation (YAML documents)
//! - Guard expression evaluation
//! - Guard/action resolution
//! - Transition execution with notifications and history
//! - Test assertion helpers

pub mod action;
pub mod catalog;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod event;
pub mod guard;
pub mod history;
pub mod loader;
pub mod resolver;
pub mod subject;
pub mod testing;

pub use action::Action;
pub use catalog::MachineCatalog;
pub use config::{ConfigError, EngineConfig};
pub use definition::{Definition, DefinitionRaw, Transition, TransitionRaw};
pub use engine::{TransitionEngine, TransitionOutcome};
pub use error::{BoxError, CoreError};
pub use event::{EventBus, EventFilter, EventKind, NotificationBus, TransitionEvent};
pub use guard::{Guard, GuardEvaluator, GuardExpr, GuardSpec};
pub use history::{HistoryRecord, HistorySink, HistoryStore};
pub use loader::DefinitionLoader;
pub use resolver::{Component, ComponentRegistry, Resolver};
pub use subject::{MemorySubject, Subject};
