//! Guard specifications and their evaluation.
//!
//! A transition guard is either a single named predicate or a boolean
//! expression tree over named predicates. In a definition document a guard
//! can be written in three ways:
//!
//! - `IsManager` - a single guard identifier
//! - `{and: [IsManager, {not: IsBlacklisted}]}` - a combinator mapping;
//!   `and`/`or` take lists, `not` takes a single guard
//! - `IsManager && !(IsBlacklisted || IsSuspended)` - infix form with `&&`,
//!   `||`, `!` and parentheses (`&&` binds tighter than `||`)
//!
//! Evaluation is depth-first, left-to-right and short-circuiting, so guards
//! with side effects observe a deterministic call order.

use crate::error::CoreError;
use crate::resolver::Resolver;
use crate::subject::Subject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A predicate gating a transition.
pub trait Guard: Send + Sync {
    /// Returns whether `subject` may move from `from` to `to`.
    fn check(&self, subject: &dyn Subject, from: &str, to: &str) -> bool;
}

impl<F> Guard for F
where
    F: Fn(&dyn Subject, &str, &str) -> bool + Send + Sync,
{
    fn check(&self, subject: &dyn Subject, from: &str, to: &str) -> bool {
        self(subject, from, to)
    }
}

/// A guard attached to a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum GuardSpec {
    /// Reference to a single guard predicate.
    Named(String),
    /// Boolean combinator tree.
    Expression(GuardExpr),
}

/// Boolean combinators over guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardExpr {
    And(Vec<GuardSpec>),
    Or(Vec<GuardSpec>),
    Not(Box<GuardSpec>),
}

impl GuardSpec {
    pub fn named(id: impl Into<String>) -> Self {
        GuardSpec::Named(id.into())
    }

    pub fn and(specs: impl IntoIterator<Item = GuardSpec>) -> Self {
        GuardSpec::Expression(GuardExpr::And(specs.into_iter().collect()))
    }

    pub fn or(specs: impl IntoIterator<Item = GuardSpec>) -> Self {
        GuardSpec::Expression(GuardExpr::Or(specs.into_iter().collect()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(spec: GuardSpec) -> Self {
        GuardSpec::Expression(GuardExpr::Not(Box::new(spec)))
    }

    /// Parses a guard from its document form.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err(invalid(format!(
                        "expression must have exactly one of 'and', 'or', 'not' (found {} keys)",
                        map.len()
                    )));
                }
                // len == 1 checked above
                let (key, inner) = map.iter().next().ok_or_else(|| invalid("empty expression"))?;
                match key.as_str() {
                    "and" => Ok(GuardSpec::Expression(GuardExpr::And(parse_list(
                        "and", inner,
                    )?))),
                    "or" => Ok(GuardSpec::Expression(GuardExpr::Or(parse_list("or", inner)?))),
                    "not" => match inner {
                        Value::String(_) | Value::Object(_) => {
                            Ok(GuardSpec::not(Self::from_value(inner)?))
                        }
                        other => Err(invalid(format!(
                            "'not' expects a guard name or expression, got {}",
                            value_kind(other)
                        ))),
                    },
                    other => Err(invalid(format!("unknown operator '{}'", other))),
                }
            }
            other => Err(invalid(format!(
                "guard must be a string or mapping, got {}",
                value_kind(other)
            ))),
        }
    }

    /// Parses a guard from a string: a bare identifier or an infix expression.
    ///
    /// A string without operators is taken verbatim as a guard name; its
    /// shape is left to reference validation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid("empty guard expression"));
        }
        if !s.contains(&OPERATOR_CHARS[..]) {
            return Ok(GuardSpec::Named(s.to_string()));
        }

        let mut parser = Parser::new(s);
        let spec = parser.parse_expr()?;
        parser.skip_whitespace();
        if parser.pos < parser.input.len() {
            return Err(invalid(format!(
                "unexpected input at offset {}: '{}'",
                parser.pos,
                &parser.input[parser.pos..]
            )));
        }
        Ok(spec)
    }

    /// Converts the guard back to its document form.
    pub fn to_value(&self) -> Value {
        match self {
            GuardSpec::Named(id) => Value::String(id.clone()),
            GuardSpec::Expression(GuardExpr::And(list)) => {
                serde_json::json!({ "and": list.iter().map(GuardSpec::to_value).collect::<Vec<_>>() })
            }
            GuardSpec::Expression(GuardExpr::Or(list)) => {
                serde_json::json!({ "or": list.iter().map(GuardSpec::to_value).collect::<Vec<_>>() })
            }
            GuardSpec::Expression(GuardExpr::Not(inner)) => {
                serde_json::json!({ "not": inner.to_value() })
            }
        }
    }

    /// Returns every guard identifier referenced by this spec, in evaluation order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            GuardSpec::Named(id) => out.push(id),
            GuardSpec::Expression(GuardExpr::And(list) | GuardExpr::Or(list)) => {
                for spec in list {
                    spec.collect_identifiers(out);
                }
            }
            GuardSpec::Expression(GuardExpr::Not(inner)) => inner.collect_identifiers(out),
        }
    }

    /// Returns true for combinator trees.
    pub fn is_expression(&self) -> bool {
        matches!(self, GuardSpec::Expression(_))
    }
}

/// Identifier for named guards, compact JSON for expressions.
impl fmt::Display for GuardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardSpec::Named(id) => f.write_str(id),
            GuardSpec::Expression(_) => write!(f, "{}", self.to_value()),
        }
    }
}

impl TryFrom<Value> for GuardSpec {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        GuardSpec::from_value(&value)
    }
}

impl From<GuardSpec> for Value {
    fn from(spec: GuardSpec) -> Self {
        spec.to_value()
    }
}

/// Characters that make a guard string an infix expression.
const OPERATOR_CHARS: [char; 5] = ['&', '|', '!', '(', ')'];

fn parse_list(op: &str, value: &Value) -> Result<Vec<GuardSpec>, CoreError> {
    match value {
        Value::Array(items) => items.iter().map(GuardSpec::from_value).collect(),
        other => Err(invalid(format!(
            "'{}' expects a list of guards, got {}",
            op,
            value_kind(other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn invalid(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidGuardExpression {
        reason: reason.into(),
    }
}

/// Recursive descent parser for infix guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<GuardSpec, CoreError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<GuardSpec, CoreError> {
        let first = self.parse_and()?;
        self.skip_whitespace();

        let mut terms = vec![first];
        while self.peek_str("||") {
            self.pos += 2;
            self.skip_whitespace();
            terms.push(self.parse_and()?);
            self.skip_whitespace();
        }

        Ok(collapse(terms, GuardExpr::Or))
    }

    fn parse_and(&mut self) -> Result<GuardSpec, CoreError> {
        let first = self.parse_unary()?;
        self.skip_whitespace();

        let mut terms = vec![first];
        while self.peek_str("&&") {
            self.pos += 2;
            self.skip_whitespace();
            terms.push(self.parse_unary()?);
            self.skip_whitespace();
        }

        Ok(collapse(terms, GuardExpr::And))
    }

    fn parse_unary(&mut self) -> Result<GuardSpec, CoreError> {
        self.skip_whitespace();

        if self.peek_char() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?;
            return Ok(GuardSpec::not(inner));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<GuardSpec, CoreError> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(invalid("expected ')'"));
            }
            self.pos += 1;
            return Ok(expr);
        }

        self.parse_identifier().map(GuardSpec::Named)
    }

    fn parse_identifier(&mut self) -> Result<String, CoreError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        let ident = &self.input[start..self.pos];
        if ident.is_empty() {
            return Err(match self.peek_char() {
                Some(c) => invalid(format!("expected guard name at offset {}, found '{}'", start, c)),
                None => invalid("expected guard name, found end of input"),
            });
        }

        Ok(ident.to_string())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }
}

fn collapse(mut terms: Vec<GuardSpec>, combine: fn(Vec<GuardSpec>) -> GuardExpr) -> GuardSpec {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        GuardSpec::Expression(combine(terms))
    }
}

/// Evaluates guard specs against a subject, resolving names through a [`Resolver`].
pub struct GuardEvaluator<'a> {
    resolver: &'a dyn Resolver,
}

impl<'a> GuardEvaluator<'a> {
    pub fn new(resolver: &'a dyn Resolver) -> Self {
        Self { resolver }
    }

    /// Evaluates a guard for a `from -> to` move of `subject`.
    pub fn evaluate(
        &self,
        spec: &GuardSpec,
        subject: &dyn Subject,
        from: &str,
        to: &str,
    ) -> Result<bool, CoreError> {
        match spec {
            GuardSpec::Named(id) => {
                let guard = self.resolver.resolve_guard(id)?;
                let passed = guard.check(subject, from, to);
                tracing::debug!(guard = %id, from, to, passed, "guard evaluated");
                Ok(passed)
            }
            GuardSpec::Expression(GuardExpr::And(list)) => {
                for member in list {
                    if !self.evaluate(member, subject, from, to)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            GuardSpec::Expression(GuardExpr::Or(list)) => {
                for member in list {
                    if self.evaluate(member, subject, from, to)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            GuardSpec::Expression(GuardExpr::Not(inner)) => {
                Ok(!self.evaluate(inner, subject, from, to)?)
            }
        }
    }

    /// Evaluates an optional guard (None = always true).
    pub fn evaluate_opt(
        &self,
        spec: Option<&GuardSpec>,
        subject: &dyn Subject,
        from: &str,
        to: &str,
    ) -> Result<bool, CoreError> {
        match spec {
            Some(spec) => self.evaluate(spec, subject, from, to),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ComponentRegistry;
    use crate::subject::MemorySubject;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn constant_registry() -> ComponentRegistry {
        let registry = ComponentRegistry::new();
        registry.register_guard_fn("T", |_, _, _| true);
        registry.register_guard_fn("F", |_, _, _| false);
        registry
    }

    fn eval(registry: &ComponentRegistry, spec: &GuardSpec) -> bool {
        let subject = MemorySubject::new("Order");
        GuardEvaluator::new(registry)
            .evaluate(spec, &subject, "a", "b")
            .unwrap()
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(GuardSpec::parse("IsManager").unwrap(), GuardSpec::named("IsManager"));
        assert_eq!(
            GuardSpec::parse("  guards::IsManager ").unwrap(),
            GuardSpec::named("guards::IsManager")
        );
    }

    #[test]
    fn test_parse_mapping_forms() {
        let spec = GuardSpec::from_value(&json!({
            "and": ["IsManager", {"not": "IsBlacklisted"}, {"or": ["IsVIP", "IsUrgent"]}]
        }))
        .unwrap();

        assert_eq!(
            spec,
            GuardSpec::and([
                GuardSpec::named("IsManager"),
                GuardSpec::not(GuardSpec::named("IsBlacklisted")),
                GuardSpec::or([GuardSpec::named("IsVIP"), GuardSpec::named("IsUrgent")]),
            ])
        );
        assert_eq!(
            spec.identifiers(),
            vec!["IsManager", "IsBlacklisted", "IsVIP", "IsUrgent"]
        );
    }

    #[test]
    fn test_parse_nested_not() {
        let spec = GuardSpec::from_value(&json!({"not": {"and": ["A", "B"]}})).unwrap();
        assert_eq!(
            spec,
            GuardSpec::not(GuardSpec::and([GuardSpec::named("A"), GuardSpec::named("B")]))
        );
    }

    #[test]
    fn test_parse_infix() {
        let spec = GuardSpec::parse("A && !B || C").unwrap();
        assert_eq!(
            spec,
            GuardSpec::or([
                GuardSpec::and([GuardSpec::named("A"), GuardSpec::not(GuardSpec::named("B"))]),
                GuardSpec::named("C"),
            ])
        );

        let spec = GuardSpec::parse("(A || B) && C").unwrap();
        assert_eq!(
            spec,
            GuardSpec::and([
                GuardSpec::or([GuardSpec::named("A"), GuardSpec::named("B")]),
                GuardSpec::named("C"),
            ])
        );
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(GuardSpec::from_value(&json!(42)).is_err());
        assert!(GuardSpec::from_value(&json!(["A", "B"])).is_err());
        assert!(GuardSpec::from_value(&json!({"xor": ["A"]})).is_err());
        assert!(GuardSpec::from_value(&json!({"and": "A"})).is_err());
        assert!(GuardSpec::from_value(&json!({"not": ["A"]})).is_err());
        assert!(GuardSpec::from_value(&json!({"and": ["A"], "or": ["B"]})).is_err());
        assert!(GuardSpec::from_value(&json!({"and": ["A", 3]})).is_err());
        assert!(GuardSpec::parse("").is_err());
        assert!(GuardSpec::parse("(A && B").is_err());
        assert!(GuardSpec::parse("A &&").is_err());
        assert!(GuardSpec::parse("A B && C").is_err());

        let err = GuardSpec::from_value(&json!({"xor": []})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidGuardExpression { .. }));
    }

    #[test]
    fn test_plain_names_kept_verbatim() {
        assert_eq!(GuardSpec::parse("is-manager").unwrap(), GuardSpec::named("is-manager"));
        assert_eq!(
            GuardSpec::parse(r"App\Guards\IsManager").unwrap(),
            GuardSpec::named(r"App\Guards\IsManager")
        );
        assert_eq!(
            GuardSpec::from_value(&json!(" has budget ")).unwrap(),
            GuardSpec::named("has budget")
        );
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(GuardSpec::named("IsManager").to_string(), "IsManager");
        let spec = GuardSpec::and([GuardSpec::named("A"), GuardSpec::named("B")]);
        assert_eq!(spec.to_string(), r#"{"and":["A","B"]}"#);
    }

    #[test]
    fn test_serde_roundtrip_uses_document_form() {
        let spec = GuardSpec::or([GuardSpec::named("A"), GuardSpec::not(GuardSpec::named("B"))]);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, json!({"or": ["A", {"not": "B"}]}));
        let back: GuardSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_empty_combinators() {
        let registry = constant_registry();
        assert!(eval(&registry, &GuardSpec::and([])));
        assert!(!eval(&registry, &GuardSpec::or([])));
    }

    #[test]
    fn test_unresolved_guard_propagates() {
        let registry = constant_registry();
        let subject = MemorySubject::new("Order");
        let err = GuardEvaluator::new(&registry)
            .evaluate(&GuardSpec::named("Missing"), &subject, "a", "b")
            .unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedGuard { guard } if guard == "Missing"));
    }

    #[test]
    fn test_short_circuit_order() {
        let registry = ComponentRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for (name, result) in [("A", true), ("B", false), ("C", true)] {
            let calls = calls.clone();
            registry.register_guard_fn(name, move |_, _, _| {
                calls.lock().push(name);
                result
            });
        }

        let spec = GuardSpec::parse("A && B && C").unwrap();
        assert!(!eval(&registry, &spec));
        assert_eq!(*calls.lock(), vec!["A", "B"]);

        calls.lock().clear();
        let spec = GuardSpec::parse("B || A || C").unwrap();
        assert!(eval(&registry, &spec));
        assert_eq!(*calls.lock(), vec!["B", "A"]);
    }

    #[test]
    fn test_guard_receives_subject_and_states() {
        let registry = ComponentRegistry::new();
        registry.register_guard_fn("HasMinimumAmount", |subject, from, to| {
            from == "draft"
                && to == "pending"
                && subject
                    .get_field("amount")
                    .and_then(|v| v.as_f64())
                    .map(|amount| amount >= 100.0)
                    .unwrap_or(false)
        });

        let mut subject = MemorySubject::new("Order");
        subject.set_field("amount", json!(150));
        let evaluator = GuardEvaluator::new(&registry);
        let spec = GuardSpec::named("HasMinimumAmount");
        assert!(evaluator.evaluate(&spec, &subject, "draft", "pending").unwrap());
        assert!(!evaluator.evaluate(&spec, &subject, "pending", "approved").unwrap());

        subject.set_field("amount", json!(50));
        assert!(!evaluator.evaluate(&spec, &subject, "draft", "pending").unwrap());
    }

    #[test]
    fn test_evaluate_opt_none_passes() {
        let registry = constant_registry();
        let subject = MemorySubject::new("Order");
        assert!(GuardEvaluator::new(&registry)
            .evaluate_opt(None, &subject, "a", "b")
            .unwrap());
    }

    fn arb_spec() -> impl Strategy<Value = GuardSpec> {
        let leaf = prop_oneof![Just(GuardSpec::named("T")), Just(GuardSpec::named("F"))];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(GuardSpec::and),
                prop::collection::vec(inner.clone(), 0..4).prop_map(GuardSpec::or),
                inner.prop_map(GuardSpec::not),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_double_negation(spec in arb_spec()) {
            let registry = constant_registry();
            let doubled = GuardSpec::not(GuardSpec::not(spec.clone()));
            prop_assert_eq!(eval(&registry, &doubled), eval(&registry, &spec));
        }

        #[test]
        fn prop_singleton_combinators(spec in arb_spec()) {
            let registry = constant_registry();
            let plain = eval(&registry, &spec);
            prop_assert_eq!(eval(&registry, &GuardSpec::and([spec.clone()])), plain);
            prop_assert_eq!(eval(&registry, &GuardSpec::or([spec])), plain);
        }

        #[test]
        fn prop_de_morgan(a in arb_spec(), b in arb_spec()) {
            let registry = constant_registry();
            let lhs = GuardSpec::not(GuardSpec::and([a.clone(), b.clone()]));
            let rhs = GuardSpec::or([GuardSpec::not(a), GuardSpec::not(b)]);
            prop_assert_eq!(eval(&registry, &lhs), eval(&registry, &rhs));
        }

        #[test]
        fn prop_document_form_roundtrip(spec in arb_spec()) {
            let back = GuardSpec::from_value(&spec.to_value()).unwrap();
            prop_assert_eq!(back, spec);
        }
    }
}
