//! Transition actions.

use crate::error::BoxError;
use crate::subject::Subject;

/// A side-effecting routine run when a transition is taken.
///
/// Actions run before the state field is written. An error aborts the
/// transition, but any changes the action already made to the subject stay.
pub trait Action: Send + Sync {
    fn execute(&self, subject: &mut dyn Subject, from: &str, to: &str) -> Result<(), BoxError>;
}

impl<F> Action for F
where
    F: Fn(&mut dyn Subject, &str, &str) -> Result<(), BoxError> + Send + Sync,
{
    fn execute(&self, subject: &mut dyn Subject, from: &str, to: &str) -> Result<(), BoxError> {
        self(subject, from, to)
    }
}
