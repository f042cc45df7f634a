//! Per-machine engine cache.

use crate::config::EngineConfig;
use crate::definition::Definition;
use crate::engine::TransitionEngine;
use crate::error::CoreError;
use crate::event::NotificationBus;
use crate::loader::DefinitionLoader;
use crate::resolver::Resolver;
use dashmap::DashMap;
use std::sync::Arc;

/// Builds one [`TransitionEngine`] per machine and reuses it.
///
/// Machines are loaded lazily through the [`DefinitionLoader`] on first use.
/// Engines are keyed by machine name (`state_machine.name`); a source id that
/// differs from the name it loaded is remembered as an alias.
pub struct MachineCatalog {
    loader: DefinitionLoader,
    resolver: Arc<dyn Resolver>,
    bus: Option<Arc<dyn NotificationBus>>,
    config: EngineConfig,
    engines: DashMap<String, Arc<TransitionEngine>>,
    /// source id -> machine name
    sources: DashMap<String, String>,
}

impl MachineCatalog {
    /// Creates a catalog reading from the configured definitions directory.
    pub fn new(config: EngineConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            loader: DefinitionLoader::from_config(&config),
            resolver,
            bus: None,
            config,
            engines: DashMap::new(),
            sources: DashMap::new(),
        }
    }

    pub fn with_loader(mut self, loader: DefinitionLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn loader(&self) -> &DefinitionLoader {
        &self.loader
    }

    /// Returns the engine for `name`, loading its definition on first use.
    ///
    /// `name` is a machine name or a loader source id.
    pub fn engine(&self, name: &str) -> Result<Arc<TransitionEngine>, CoreError> {
        if let Some(engine) = self.cached(name) {
            return Ok(engine);
        }

        // Load outside the map so no shard lock is held during I/O.
        let definition = self.loader.load(name)?;
        let machine = definition.name().to_string();
        let engine = Arc::new(self.build(Arc::new(definition)));

        // A concurrent caller may have won; keep whichever landed first.
        let entry = self
            .engines
            .entry(machine.clone())
            .or_insert_with(|| engine.clone())
            .clone();
        if machine != name {
            self.sources.insert(name.to_string(), machine);
        }
        Ok(entry)
    }

    /// Registers a pre-built definition under its name, replacing any cached engine.
    pub fn register(&self, definition: Definition) -> Arc<TransitionEngine> {
        let name = definition.name().to_string();
        let engine = Arc::new(self.build(Arc::new(definition)));
        tracing::debug!(machine = %name, "registered state machine");
        self.engines.insert(name, engine.clone());
        engine
    }

    /// Returns true if an engine for `name` (machine name or source id) is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.cached(name).is_some()
    }

    /// Cached machine names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn cached(&self, name: &str) -> Option<Arc<TransitionEngine>> {
        if let Some(engine) = self.engines.get(name) {
            return Some(engine.clone());
        }
        let machine = self.sources.get(name).map(|m| m.value().clone())?;
        self.engines.get(&machine).map(|engine| engine.clone())
    }

    fn build(&self, definition: Arc<Definition>) -> TransitionEngine {
        let engine = TransitionEngine::new(definition, self.resolver.clone())
            .with_config(self.config.clone());
        match &self.bus {
            Some(bus) => engine.with_bus(bus.clone()),
            None => engine,
        }
    }
}
