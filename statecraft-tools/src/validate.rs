//! Definition validators.
//!
//! Construction already rejects definitions that cannot run (unknown
//! states, missing initial state). The checks here report everything else
//! worth fixing, all at once, without resolving any guard or action.

use serde::Serialize;
use statecraft_core::{Definition, DefinitionLoader};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Definition failed to load.
    Load,
    /// Missing or empty required value.
    Structure,
    /// Guard or action identifier is malformed.
    Reference,
    /// Subject type is not one of the known types.
    SubjectType,
    /// State cannot be entered.
    Unreachable,
    /// Same `(from, to)` pair declared more than once.
    DuplicateTransition,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Index of the offending transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<usize>,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            transition: None,
            message: message.into(),
        }
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            transition: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.transition = Some(index);
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transition {
            Some(index) => write!(f, "transition #{}: {}", index, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Aggregated findings for one definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Source id or machine name the report is about.
    pub source: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            issues: Vec::new(),
        }
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        self.issues.extend(issues);
    }

    /// True when there are no error-severity issues.
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Configurable validator.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    known_subject_types: Option<HashSet<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts subject types to the given set.
    pub fn with_known_subject_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_subject_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Runs every check.
    pub fn validate(&self, definition: &Definition) -> ValidationReport {
        let mut report = ValidationReport::new(definition.name());
        report.extend(validate_structure(definition));
        report.extend(validate_references(definition));
        if let Some(known) = &self.known_subject_types {
            if !known.contains(definition.subject_type()) {
                report.extend([ValidationIssue::error(
                    IssueKind::SubjectType,
                    format!("subject type '{}' is not known", definition.subject_type()),
                )]);
            }
        }
        report.extend(validate_reachability(definition));
        report.extend(validate_duplicates(definition));
        report
    }

    /// Loads `source_id` and validates it; load failures become report issues.
    pub fn validate_file(&self, loader: &DefinitionLoader, source_id: &str) -> ValidationReport {
        match loader.load(source_id) {
            Ok(definition) => {
                let mut report = self.validate(&definition);
                report.source = source_id.to_string();
                report
            }
            Err(e) => {
                tracing::debug!(source_id, error = %e, "definition failed to load");
                let mut report = ValidationReport::new(source_id);
                report.extend([ValidationIssue::error(
                    IssueKind::Load,
                    format!("failed to load: {}", e),
                )]);
                report
            }
        }
    }
}

/// Runs every check with the default validator.
pub fn validate(definition: &Definition) -> ValidationReport {
    Validator::new().validate(definition)
}

/// Loads and validates a file with the default validator.
pub fn validate_file(loader: &DefinitionLoader, source_id: &str) -> ValidationReport {
    Validator::new().validate_file(loader, source_id)
}

/// Checks required values are present.
pub fn validate_structure(definition: &Definition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let required = [
        ("name", definition.name()),
        ("model", definition.subject_type()),
        ("initial", definition.initial()),
        ("field", definition.state_field()),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            issues.push(ValidationIssue::error(
                IssueKind::Structure,
                format!("'{}' is required", key),
            ));
        }
    }
    if definition.states().is_empty() {
        issues.push(ValidationIssue::error(
            IssueKind::Structure,
            "at least one state is required",
        ));
    }
    issues
}

/// Checks guard and action identifiers look like identifiers.
pub fn validate_references(definition: &Definition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (index, transition) in definition.transitions().iter().enumerate() {
        if let Some(guard) = &transition.guard {
            for id in guard.identifiers() {
                if !is_valid_identifier(id) {
                    issues.push(
                        ValidationIssue::error(
                            IssueKind::Reference,
                            format!("guard '{}' is not a valid identifier", id),
                        )
                        .at(index),
                    );
                }
            }
        }
        if let Some(action) = &transition.action {
            if !is_valid_identifier(action) {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::Reference,
                        format!("action '{}' is not a valid identifier", action),
                    )
                    .at(index),
                );
            }
        }
    }
    issues
}

/// Reports states that are neither initial nor the target of any transition.
pub fn validate_reachability(definition: &Definition) -> Vec<ValidationIssue> {
    let mut entered: HashSet<&str> = definition
        .transitions()
        .iter()
        .map(|t| t.to.as_str())
        .collect();
    entered.insert(definition.initial());

    definition
        .states()
        .iter()
        .filter(|s| !entered.contains(s.as_str()))
        .map(|s| {
            ValidationIssue::warning(
                IssueKind::Unreachable,
                format!("state '{}' is not reachable from initial state", s),
            )
        })
        .collect()
}

/// Reports `(from, to)` pairs declared more than once; only the first is ever used.
pub fn validate_duplicates(definition: &Definition) -> Vec<ValidationIssue> {
    let mut first_seen: HashMap<(&str, &str), usize> = HashMap::new();
    let mut issues = Vec::new();
    for (index, t) in definition.transitions().iter().enumerate() {
        let key = (t.from.as_str(), t.to.as_str());
        match first_seen.get(&key) {
            Some(first) => issues.push(
                ValidationIssue::warning(
                    IssueKind::DuplicateTransition,
                    format!(
                        "duplicate of transition #{} ({}); it will never be used",
                        first,
                        t.label()
                    ),
                )
                .at(index),
            ),
            None => {
                first_seen.insert(key, index);
            }
        }
    }
    issues
}

/// Matches `^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$`.
pub fn is_valid_identifier(id: &str) -> bool {
    id.split("::").all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use statecraft_core::{GuardSpec, Transition};

    fn definition(transitions: Vec<Transition>) -> Definition {
        Definition::new(
            "order_workflow",
            "Order",
            "state",
            vec![
                "draft".into(),
                "pending".into(),
                "approved".into(),
                "archived".into(),
            ],
            "draft",
            transitions,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_definition() {
        let def = definition(vec![
            Transition::new("draft", "pending").with_guard(GuardSpec::named("guards::CanSubmit")),
            Transition::new("pending", "approved").with_action("Notify"),
            Transition::new("approved", "archived"),
        ]);
        let report = validate(&def);
        assert!(report.is_valid());
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_unreachable_and_bad_identifiers_reported_together() {
        let def = definition(vec![
            Transition::new("draft", "pending")
                .with_guard(GuardSpec::and([GuardSpec::named("Ok"), GuardSpec::named("9bad")])),
            Transition::new("pending", "approved").with_action("not-valid"),
        ]);
        let report = validate(&def);

        assert!(!report.is_valid());
        assert!(report.has_kind(IssueKind::Unreachable));
        let refs: Vec<_> = report
            .errors()
            .filter(|i| i.kind == IssueKind::Reference)
            .collect();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].transition, Some(0));
        assert_eq!(refs[1].transition, Some(1));
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_duplicates_are_warnings() {
        let def = definition(vec![
            Transition::new("draft", "pending"),
            Transition::new("pending", "approved"),
            Transition::new("draft", "pending").with_action("Other"),
            Transition::new("approved", "archived"),
        ]);
        let report = validate(&def);
        assert!(report.is_valid());
        let dup: Vec<_> = report.warnings().collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].kind, IssueKind::DuplicateTransition);
        assert_eq!(dup[0].transition, Some(2));
        assert!(dup[0].to_string().starts_with("transition #2: duplicate of transition #0"));
    }

    #[test]
    fn test_structure_reports_empty_values() {
        let def = Definition::new("", " ", "", vec!["a".into()], "a", vec![]).unwrap();
        let issues = validate_structure(&def);
        let messages: Vec<_> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["'name' is required", "'model' is required", "'field' is required"]
        );
    }

    #[test]
    fn test_known_subject_types() {
        let def = definition(vec![]);
        let report = Validator::new()
            .with_known_subject_types(["Article"])
            .validate(&def);
        assert!(report.has_kind(IssueKind::SubjectType));
        assert!(!report.is_valid());

        let report = Validator::new()
            .with_known_subject_types(["Order"])
            .validate(&def);
        assert!(!report.has_kind(IssueKind::SubjectType));
    }

    #[test]
    fn test_validate_file_reports_load_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("bad.yaml"),
            "state_machine:\n  name: bad\n  model: Order\n  states: [a]\n  initial: b\n",
        )
        .unwrap();
        let loader = DefinitionLoader::new(dir.path());

        let report = validate_file(&loader, "bad");
        assert_eq!(report.source, "bad");
        assert!(!report.is_valid());
        assert!(report.issues[0].message.contains("initial state 'b'"));

        let missing = validate_file(&loader, "missing");
        assert!(missing.has_kind(IssueKind::Load));
    }

    #[test]
    fn test_validate_file_aggregates_reference_and_reachability() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("flow.yaml"),
            "state_machine:\n  name: flow\n  model: Order\n  states: [a, b, orphan]\n  initial: a\n  transitions:\n    - from: a\n      to: b\n      guard: is-manager\n",
        )
        .unwrap();
        let loader = DefinitionLoader::new(dir.path());

        let report = validate_file(&loader, "flow");
        assert!(!report.is_valid());
        assert!(!report.has_kind(IssueKind::Load));
        assert!(report.has_kind(IssueKind::Reference));
        assert!(report.has_kind(IssueKind::Unreachable));
    }

    #[test]
    fn test_identifier_examples() {
        assert!(is_valid_identifier("IsManager"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("app::guards::IsManager"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1Guard"));
        assert!(!is_valid_identifier("guards::"));
        assert!(!is_valid_identifier("a:b"));
        assert!(!is_valid_identifier("has space"));
    }

    proptest! {
        #[test]
        fn prop_generated_identifiers_are_valid(id in "[A-Za-z_][A-Za-z0-9_]{0,8}(::[A-Za-z_][A-Za-z0-9_]{0,8}){0,3}") {
            prop_assert!(is_valid_identifier(&id));
        }

        #[test]
        fn prop_leading_digit_is_invalid(id in "[0-9][A-Za-z0-9_]{0,8}") {
            prop_assert!(!is_valid_identifier(&id));
        }
    }
}
