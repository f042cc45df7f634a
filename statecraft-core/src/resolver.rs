//! Resolution of guard and action identifiers.
//!
//! Definitions refer to guards and actions by name. A [`Resolver`] turns those
//! names into invocable components. [`ComponentRegistry`] is the default
//! strategy: components are registered under an identifier, and a bare
//! identifier (no `::`) that is not registered is retried under the
//! configured default namespace, so `IsManager` also finds
//! `guards::IsManager`.

use crate::action::Action;
use crate::config::ResolverConfig;
use crate::error::{BoxError, CoreError};
use crate::guard::Guard;
use crate::subject::Subject;
use dashmap::DashMap;
use std::sync::Arc;

/// Separator between namespace segments in identifiers.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Maps guard and action identifiers to components.
pub trait Resolver: Send + Sync {
    fn resolve_guard(&self, id: &str) -> Result<Arc<dyn Guard>, CoreError>;

    fn resolve_action(&self, id: &str) -> Result<Arc<dyn Action>, CoreError>;
}

/// A registered component.
#[derive(Clone)]
pub enum Component {
    Guard(Arc<dyn Guard>),
    Action(Arc<dyn Action>),
}

impl Component {
    fn kind(&self) -> &'static str {
        match self {
            Component::Guard(_) => "guard",
            Component::Action(_) => "action",
        }
    }
}

type Factory = Arc<dyn Fn() -> Component + Send + Sync>;

/// Name-to-factory registry of guards and actions.
pub struct ComponentRegistry {
    factories: DashMap<String, Factory>,
    config: ResolverConfig,
}

impl ComponentRegistry {
    /// Creates an empty registry with the default namespaces.
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self {
            factories: DashMap::new(),
            config,
        }
    }

    /// Registers a shared guard instance.
    pub fn register_guard(&self, id: impl Into<String>, guard: impl Guard + 'static) {
        let guard: Arc<dyn Guard> = Arc::new(guard);
        self.register_component(id, move || Component::Guard(guard.clone()));
    }

    /// Registers a guard from a closure.
    pub fn register_guard_fn<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&dyn Subject, &str, &str) -> bool + Send + Sync + 'static,
    {
        self.register_guard(id, f);
    }

    /// Registers a factory invoked on every resolution of `id`.
    pub fn register_guard_factory<F, G>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> G + Send + Sync + 'static,
        G: Guard + 'static,
    {
        self.register_component(id, move || Component::Guard(Arc::new(factory())));
    }

    /// Registers a shared action instance.
    pub fn register_action(&self, id: impl Into<String>, action: impl Action + 'static) {
        let action: Arc<dyn Action> = Arc::new(action);
        self.register_component(id, move || Component::Action(action.clone()));
    }

    /// Registers an action from a closure.
    pub fn register_action_fn<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&mut dyn Subject, &str, &str) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register_action(id, f);
    }

    /// Registers a factory invoked on every resolution of `id`.
    pub fn register_action_factory<F, A>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: Action + 'static,
    {
        self.register_component(id, move || Component::Action(Arc::new(factory())));
    }

    /// Registers an arbitrary component factory.
    pub fn register_component<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Component + Send + Sync + 'static,
    {
        let id = id.into();
        tracing::debug!(id = %id, "registered component");
        self.factories.insert(id, Arc::new(factory));
    }

    /// Returns true if `id` is registered exactly.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Returns the registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Looks up `id`, retrying under `namespace` for bare identifiers.
    fn lookup(&self, id: &str, namespace: &str) -> Option<Component> {
        // Clone the factory out so no shard lock is held while it runs.
        if let Some(factory) = self.factory(id) {
            return Some(factory());
        }

        if id.contains(NAMESPACE_SEPARATOR) || namespace.is_empty() {
            return None;
        }

        let qualified = format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, id);
        let factory = self.factory(&qualified)?;
        tracing::debug!(id, qualified = %qualified, "resolved through default namespace");
        Some(factory())
    }

    fn factory(&self, id: &str) -> Option<Factory> {
        self.factories.get(id).map(|entry| entry.value().clone())
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for ComponentRegistry {
    fn resolve_guard(&self, id: &str) -> Result<Arc<dyn Guard>, CoreError> {
        match self.lookup(id, &self.config.guard_namespace) {
            Some(Component::Guard(guard)) => Ok(guard),
            Some(other) => {
                tracing::warn!(id, found = other.kind(), "identifier is not a guard");
                Err(CoreError::ContractViolation {
                    identifier: id.to_string(),
                    expected: "guard",
                })
            }
            None => Err(CoreError::UnresolvedGuard {
                guard: id.to_string(),
            }),
        }
    }

    fn resolve_action(&self, id: &str) -> Result<Arc<dyn Action>, CoreError> {
        match self.lookup(id, &self.config.action_namespace) {
            Some(Component::Action(action)) => Ok(action),
            Some(other) => {
                tracing::warn!(id, found = other.kind(), "identifier is not an action");
                Err(CoreError::ContractViolation {
                    identifier: id.to_string(),
                    expected: "action",
                })
            }
            None => Err(CoreError::UnresolvedAction {
                action: id.to_string(),
            }),
        }
    }
}
