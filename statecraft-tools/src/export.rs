//! Exporters: JSON, Mermaid, Markdown and Graphviz DOT.

use chrono::Utc;
use serde_json::json;
use statecraft_core::{CoreError, Definition, Transition};
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

/// Value of `metadata.exported_by` in JSON exports.
pub const EXPORTED_BY: &str = "statecraft";

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Mermaid,
    Markdown,
    Dot,
}

impl ExportFormat {
    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Mermaid => "mmd",
            ExportFormat::Markdown => "md",
            ExportFormat::Dot => "dot",
        }
    }
}

/// Unrecognised format name.
#[derive(Debug, Error)]
#[error("unsupported export format '{0}' (expected json, mermaid, md or dot)")]
pub struct UnknownFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "mermaid" | "mmd" => Ok(ExportFormat::Mermaid),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "dot" | "graphviz" => Ok(ExportFormat::Dot),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Renders a definition in the given format.
pub fn export(definition: &Definition, format: ExportFormat) -> Result<String, CoreError> {
    match format {
        ExportFormat::Json => to_json(definition),
        ExportFormat::Mermaid => Ok(to_mermaid(definition)),
        ExportFormat::Markdown => Ok(to_markdown(definition)),
        ExportFormat::Dot => Ok(to_dot(definition)),
    }
}

/// Pretty-printed JSON with export metadata.
pub fn to_json(definition: &Definition) -> Result<String, CoreError> {
    let raw = definition.to_raw();
    let value = json!({
        "name": raw.name,
        "model": raw.model,
        "field": definition.state_field(),
        "initial": raw.initial,
        "states": raw.states,
        "transitions": raw.transitions,
        "metadata": {
            "exported_at": Utc::now().to_rfc3339(),
            "exported_by": EXPORTED_BY,
            "version": env!("CARGO_PKG_VERSION"),
            "checksum": definition.checksum(),
        },
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Mermaid `stateDiagram-v2`.
pub fn to_mermaid(definition: &Definition) -> String {
    let mut out = String::from("stateDiagram-v2\n");
    let _ = writeln!(out, "    %% {}", definition.name());
    let _ = writeln!(out, "    [*] --> {}", definition.initial());

    for transition in definition.transitions() {
        let _ = write!(out, "    {} --> {}", transition.from, transition.to);
        if let Some(label) = edge_label(transition) {
            let _ = write!(out, " : {}", label);
        }
        out.push('\n');
    }
    out
}

/// Markdown report with an embedded Mermaid diagram.
pub fn to_markdown(definition: &Definition) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", definition.name());

    md.push_str("## Basic Information\n\n");
    let _ = writeln!(md, "- **Name**: {}", definition.name());
    let _ = writeln!(md, "- **Model**: {}", definition.subject_type());
    let _ = writeln!(md, "- **Field**: {}", definition.state_field());
    let _ = writeln!(md, "- **Initial State**: {}\n", definition.initial());

    md.push_str("## States\n\n");
    for state in definition.states() {
        let marker = if state == definition.initial() {
            " *(initial)*"
        } else {
            ""
        };
        let _ = writeln!(md, "- `{}`{}", state, marker);
    }

    md.push_str("\n## Transitions\n\n");
    md.push_str("| From | To | Guard | Action |\n");
    md.push_str("|------|----|-------|--------|\n");
    for t in definition.transitions() {
        let guard = t.guard_label().map(|g| format!("`{}`", g)).unwrap_or_default();
        let action = t.action.as_ref().map(|a| format!("`{}`", a)).unwrap_or_default();
        let _ = writeln!(md, "| `{}` | `{}` | {} | {} |", t.from, t.to, guard, action);
    }

    let transitions = definition.transitions();
    md.push_str("\n## Statistics\n\n");
    let _ = writeln!(md, "- **States**: {}", definition.states().len());
    let _ = writeln!(md, "- **Transitions**: {}", transitions.len());
    let _ = writeln!(
        md,
        "- **Guarded transitions**: {}",
        transitions.iter().filter(|t| t.guard.is_some()).count()
    );
    let _ = writeln!(
        md,
        "- **Transitions with actions**: {}",
        transitions.iter().filter(|t| t.action.is_some()).count()
    );

    md.push_str("\n## State Diagram\n\n```mermaid\n");
    md.push_str(&to_mermaid(definition));
    md.push_str("```\n\n---\n");
    let _ = writeln!(
        md,
        "*Generated by statecraft on {}*",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    md
}

/// Graphviz `digraph`; the initial state is drawn as a double circle.
pub fn to_dot(definition: &Definition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", dot_quote(definition.name()));
    out.push_str("    rankdir=LR;\n");
    out.push_str("    node [shape=circle];\n");
    out.push_str("    __start [shape=point];\n");

    for state in definition.states() {
        let shape = if state == definition.initial() {
            "doublecircle"
        } else {
            "circle"
        };
        let _ = writeln!(out, "    {} [shape={}];", dot_quote(state), shape);
    }
    let _ = writeln!(out, "    __start -> {};", dot_quote(definition.initial()));

    for t in definition.transitions() {
        let _ = write!(out, "    {} -> {}", dot_quote(&t.from), dot_quote(&t.to));
        if let Some(label) = edge_label(t) {
            let _ = write!(out, " [label={}]", dot_quote(&label));
        }
        out.push_str(";\n");
    }
    out.push_str("}\n");
    out
}

/// `[guard]`, `[guard] / action` or `[action]`.
fn edge_label(t: &Transition) -> Option<String> {
    match (t.guard_label(), &t.action) {
        (Some(guard), Some(action)) => Some(format!("[{}] / {}", guard, action)),
        (Some(guard), None) => Some(format!("[{}]", guard)),
        (None, Some(action)) => Some(format!("[{}]", action)),
        (None, None) => None,
    }
}

fn dot_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
