//! Scaffolding: new definition documents and Rust stubs for guards and actions.

use statecraft_core::resolver::NAMESPACE_SEPARATOR;
use statecraft_core::Definition;
use std::collections::HashSet;
use std::fmt::Write as _;

/// States used when none are given.
pub const DEFAULT_STATES: [&str; 2] = ["draft", "published"];

/// Inputs for a new definition document.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    pub name: String,
    /// Defaults to the singular PascalCase form of `name`.
    pub model: Option<String>,
    /// Defaults to [`DEFAULT_STATES`].
    pub states: Vec<String>,
    /// Defaults to the first state.
    pub initial: Option<String>,
    pub field: String,
}

impl TemplateOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            states: Vec::new(),
            initial: None,
            field: statecraft_core::definition::DEFAULT_STATE_FIELD.to_string(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// File name the document should be written to.
    pub fn file_name(&self) -> String {
        format!("{}.yaml", snake_case(&self.name))
    }
}

/// Renders a definition document with linear transitions between consecutive states.
pub fn definition_template(options: &TemplateOptions) -> String {
    let states: Vec<String> = if options.states.is_empty() {
        DEFAULT_STATES.iter().map(|s| s.to_string()).collect()
    } else {
        options.states.clone()
    };
    let model = options
        .model
        .clone()
        .unwrap_or_else(|| model_name(&options.name));
    let initial = options
        .initial
        .clone()
        .unwrap_or_else(|| states[0].clone());

    let mut out = String::from("state_machine:\n");
    let _ = writeln!(out, "  name: {}", yaml_scalar(&options.name));
    let _ = writeln!(out, "  model: {}", yaml_scalar(&model));
    if options.field != statecraft_core::definition::DEFAULT_STATE_FIELD {
        let _ = writeln!(out, "  field: {}", yaml_scalar(&options.field));
    }
    let list: Vec<String> = states.iter().map(|s| yaml_scalar(s)).collect();
    let _ = writeln!(out, "  states: [{}]", list.join(", "));
    let _ = writeln!(out, "  initial: {}", yaml_scalar(&initial));

    if states.len() < 2 {
        out.push_str("  transitions: []\n");
        return out;
    }
    out.push_str("  transitions:\n");
    for pair in states.windows(2) {
        let _ = writeln!(out, "    - from: {}", yaml_scalar(&pair[0]));
        let _ = writeln!(out, "      to: {}", yaml_scalar(&pair[1]));
        out.push_str("      # guard: YourGuard\n");
        out.push_str("      # action: YourAction\n");
    }
    out
}

/// Generates Rust source with a unit struct per guard and action, plus a
/// `register` function wiring them into a `ComponentRegistry`.
pub fn generate_stubs(definition: &Definition) -> String {
    let mut used = HashSet::new();
    let guards: Vec<(String, String)> = definition
        .guard_identifiers()
        .into_iter()
        .map(|id| (id.to_string(), struct_name(id, &mut used)))
        .collect();
    let actions: Vec<(String, String)> = definition
        .action_identifiers()
        .into_iter()
        .map(|id| (id.to_string(), struct_name(id, &mut used)))
        .collect();

    let mut imports = Vec::new();
    if !actions.is_empty() {
        imports.extend(["Action", "BoxError"]);
    }
    imports.push("ComponentRegistry");
    if !guards.is_empty() {
        imports.push("Guard");
    }
    if !guards.is_empty() || !actions.is_empty() {
        imports.push("Subject");
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "//! Guards and actions for the `{}` state machine.\n",
        definition.name()
    );
    let _ = writeln!(out, "use statecraft_core::{{{}}};", imports.join(", "));

    for (id, name) in &guards {
        let _ = write!(
            out,
            "\n/// Guard `{id}`.\npub struct {name};\n\n\
             impl Guard for {name} {{\n    \
             fn check(&self, _subject: &dyn Subject, _from: &str, _to: &str) -> bool {{\n        \
             todo!(\"implement {id}\")\n    \
             }}\n\
             }}\n",
        );
    }

    for (id, name) in &actions {
        let _ = write!(
            out,
            "\n/// Action `{id}`.\npub struct {name};\n\n\
             impl Action for {name} {{\n    \
             fn execute(&self, _subject: &mut dyn Subject, _from: &str, _to: &str) -> Result<(), BoxError> {{\n        \
             todo!(\"implement {id}\")\n    \
             }}\n\
             }}\n",
        );
    }

    out.push_str("\n/// Registers every guard and action of this machine.\n");
    out.push_str("pub fn register(registry: &ComponentRegistry) {\n");
    for (id, name) in &guards {
        let _ = writeln!(out, "    registry.register_guard(\"{}\", {});", id, name);
    }
    for (id, name) in &actions {
        let _ = writeln!(out, "    registry.register_action(\"{}\", {});", id, name);
    }
    if guards.is_empty() && actions.is_empty() {
        out.push_str("    let _ = registry;\n");
    }
    out.push_str("}\n");
    out
}

/// Picks a struct name for `id`, unique within `used`.
fn struct_name(id: &str, used: &mut HashSet<String>) -> String {
    let last = pascal_case(id.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(id));
    if used.insert(last.clone()) {
        return last;
    }

    // Fall back to the fully qualified name, then numbered variants.
    let base = pascal_case(&id.replace(NAMESPACE_SEPARATOR, "_"));
    let mut candidate = base.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}{}", base, n);
        n += 1;
    }
    candidate
}

/// `blog_posts` -> `BlogPost`.
fn model_name(name: &str) -> String {
    let pascal = pascal_case(name);
    match pascal.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem.to_string(),
        _ => pascal,
    }
}

fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn snake_case(s: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = true;
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Plain scalars for simple words, JSON-quoted strings otherwise.
fn yaml_scalar(s: &str) -> String {
    // Plain only when the YAML reader would give the same string back.
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && matches!(
            serde_yaml::from_str::<serde_yaml::Value>(s),
            Ok(serde_yaml::Value::String(ref parsed)) if parsed == s
        );
    if plain {
        s.to_string()
    } else {
        serde_json::Value::String(s.to_string()).to_string()
    }
}
