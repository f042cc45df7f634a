//! Assertion helpers for testing state machines.
//!
//! Each helper panics with a descriptive message on failure, so they can be
//! used directly in `#[test]` functions.

use crate::engine::TransitionEngine;
use crate::subject::Subject;

/// Asserts that `subject` may move to `to`.
#[track_caller]
pub fn assert_transition_allowed(engine: &TransitionEngine, subject: &dyn Subject, to: &str) {
    let from = engine.current_state(subject);
    match engine.can_transition(subject, to) {
        Ok(true) => {}
        Ok(false) => panic!(
            "expected transition '{}' -> '{}' to be allowed on '{}'",
            from,
            to,
            engine.definition().name()
        ),
        Err(e) => panic!("checking transition '{}' -> '{}' failed: {}", from, to, e),
    }
}

/// Asserts that `subject` may not move to `to`.
#[track_caller]
pub fn assert_transition_blocked(engine: &TransitionEngine, subject: &dyn Subject, to: &str) {
    let from = engine.current_state(subject);
    match engine.can_transition(subject, to) {
        Ok(false) => {}
        Ok(true) => panic!(
            "expected transition '{}' -> '{}' to be blocked on '{}'",
            from,
            to,
            engine.definition().name()
        ),
        Err(e) => panic!("checking transition '{}' -> '{}' failed: {}", from, to, e),
    }
}

/// Asserts the subject's current state.
#[track_caller]
pub fn assert_in_state(engine: &TransitionEngine, subject: &dyn Subject, expected: &str) {
    let actual = engine.current_state(subject);
    assert_eq!(
        actual, expected,
        "expected subject to be in state '{}', found '{}'",
        expected, actual
    );
}

/// Asserts the set of currently available target states, ignoring order.
#[track_caller]
pub fn assert_available_transitions(
    engine: &TransitionEngine,
    subject: &dyn Subject,
    expected: &[&str],
) {
    let available = match engine.available_transitions(subject) {
        Ok(list) => list,
        Err(e) => panic!("listing available transitions failed: {}", e),
    };
    let mut actual: Vec<&str> = available.iter().map(|t| t.to.as_str()).collect();
    let mut expected = expected.to_vec();
    actual.sort_unstable();
    expected.sort_unstable();
    assert_eq!(actual, expected, "available transitions differ");
}

/// Asserts that the verb can be applied now.
#[track_caller]
pub fn assert_can_apply(engine: &TransitionEngine, subject: &dyn Subject, verb: &str) {
    match engine.can_apply(subject, verb) {
        Ok(true) => {}
        Ok(false) => panic!("expected verb '{}' to be applicable", verb),
        Err(e) => panic!("checking verb '{}' failed: {}", verb, e),
    }
}

/// Asserts that the verb cannot be applied now.
#[track_caller]
pub fn assert_cannot_apply(engine: &TransitionEngine, subject: &dyn Subject, verb: &str) {
    match engine.can_apply(subject, verb) {
        Ok(false) => {}
        Ok(true) => panic!("expected verb '{}' not to be applicable", verb),
        Err(e) => panic!("checking verb '{}' failed: {}", verb, e),
    }
}

/// All declared `(from, to)` pairs of the engine's definition.
pub fn transitions_for(engine: &TransitionEngine) -> Vec<(String, String)> {
    engine
        .definition()
        .transitions()
        .iter()
        .map(|t| (t.from.clone(), t.to.clone()))
        .collect()
}
