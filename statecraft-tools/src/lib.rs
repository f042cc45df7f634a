//! # statecraft-tools
//!
//! Tooling around statecraft definitions.
//!
//! This crate provides:
//! - Structural, reference and reachability validation
//! - Export to JSON, Mermaid, Markdown and Graphviz DOT
//! - Scaffolding of definition documents and guard/action stubs

pub mod export;
pub mod scaffold;
pub mod validate;

pub use export::{export, ExportFormat, UnknownFormat};
pub use scaffold::{definition_template, generate_stubs, TemplateOptions};
pub use validate::{
    validate, validate_file, IssueKind, Severity, ValidationIssue, ValidationReport, Validator,
};
