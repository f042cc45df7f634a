//! Loading definitions from YAML documents.

use crate::config::EngineConfig;
use crate::definition::{Definition, DefinitionRaw, DEFAULT_STATE_FIELD};
use crate::error::CoreError;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root key every definition document must carry.
pub const ROOT_KEY: &str = "state_machine";

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Reads definition documents from a directory.
#[derive(Debug, Clone)]
pub struct DefinitionLoader {
    base_path: PathBuf,
    default_field: String,
}

impl DefinitionLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            default_field: DEFAULT_STATE_FIELD.to_string(),
        }
    }

    /// Creates a loader for the configured definitions directory.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.definitions_path).with_default_field(&config.default_state_field)
    }

    /// Sets the state field used when a document omits `field`.
    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = field.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolves a source id to an existing file.
    ///
    /// Ids carrying a `.yaml`/`.yml` extension are used as-is; otherwise
    /// `.yaml` is tried first, then `.yml`.
    pub fn resolve_path(&self, source_id: &str) -> Option<PathBuf> {
        let direct = self.base_path.join(source_id);
        if has_yaml_extension(&direct) {
            return direct.is_file().then_some(direct);
        }

        EXTENSIONS
            .iter()
            .map(|ext| self.base_path.join(format!("{}.{}", source_id, ext)))
            .find(|path| path.is_file())
    }

    /// Loads and validates a definition by file stem or file name.
    pub fn load(&self, source_id: &str) -> Result<Definition, CoreError> {
        let path = self
            .resolve_path(source_id)
            .ok_or_else(|| CoreError::DefinitionNotFound {
                id: source_id.to_string(),
            })?;

        tracing::debug!(source_id, path = %path.display(), "reading definition");
        let text = std::fs::read_to_string(&path)?;
        self.load_str(&text, source_id)
    }

    /// Parses and validates an in-memory document.
    pub fn load_str(&self, text: &str, source_id: &str) -> Result<Definition, CoreError> {
        let document: YamlValue =
            serde_yaml::from_str(text).map_err(|e| CoreError::DefinitionMalformed {
                id: source_id.to_string(),
                reason: e.to_string(),
            })?;

        let machine = document
            .get(ROOT_KEY)
            .ok_or_else(|| CoreError::invalid(format!("missing '{}' root key", ROOT_KEY)))?;

        check_shape(machine)?;

        let raw: DefinitionRaw = serde_yaml::from_value(machine.clone())
            .map_err(|e| CoreError::invalid(e.to_string()))?;
        let definition = Definition::from_raw(raw, &self.default_field)?;

        tracing::info!(
            source_id,
            name = definition.name(),
            states = definition.states().len(),
            transitions = definition.transitions().len(),
            checksum = definition.checksum(),
            "loaded state machine definition"
        );
        Ok(definition)
    }

    /// Loads every `*.yaml`/`*.yml` document in the base directory, keyed by file stem.
    ///
    /// A missing directory yields an empty map. Any invalid document fails the call.
    pub fn load_all(&self) -> Result<BTreeMap<String, Definition>, CoreError> {
        let mut definitions = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.base_path.display(), "definitions directory does not exist");
                return Ok(definitions);
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_yaml_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // `load` prefers .yaml, and sorting puts it before .yml
            if definitions.contains_key(stem) {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            let definition = self.load_str(&text, stem)?;
            definitions.insert(stem.to_string(), definition);
        }

        Ok(definitions)
    }

    /// Lists the source ids available in the base directory, sorted.
    pub fn source_ids(&self) -> Result<Vec<String>, CoreError> {
        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !has_yaml_extension(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

fn has_yaml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Checks required keys and basic shapes before typed deserialization.
fn check_shape(machine: &YamlValue) -> Result<(), CoreError> {
    if !machine.is_mapping() {
        return Err(CoreError::invalid(format!(
            "'{}' must be a mapping",
            ROOT_KEY
        )));
    }

    for key in ["name", "states", "initial"] {
        if is_missing(machine, key) {
            return Err(CoreError::invalid(format!("missing required key '{}'", key)));
        }
    }
    if is_missing(machine, "model") && is_missing(machine, "subject_type") {
        return Err(CoreError::invalid("missing required key 'model'"));
    }

    if !machine.get("states").map(YamlValue::is_sequence).unwrap_or(false) {
        return Err(CoreError::invalid("'states' must be a list"));
    }

    if let Some(transitions) = machine.get("transitions") {
        let Some(list) = transitions.as_sequence() else {
            return Err(CoreError::invalid("'transitions' must be a list"));
        };
        for (index, t) in list.iter().enumerate() {
            for key in ["from", "to"] {
                if is_missing(t, key) {
                    return Err(CoreError::invalid(format!(
                        "transition #{}: missing required key '{}'",
                        index, key
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Absent and null keys are both missing.
fn is_missing(mapping: &YamlValue, key: &str) -> bool {
    mapping.get(key).map_or(true, YamlValue::is_null)
}
