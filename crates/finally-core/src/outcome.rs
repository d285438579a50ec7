//! Tagged result of one action.

use crate::error::ActionError;

#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(ActionError),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn error(&self) -> Option<&ActionError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(e) => Some(e),
        }
    }

    /// Split into the success value and the failure.
    pub fn split(self) -> (Option<T>, Option<ActionError>) {
        match self {
            Outcome::Success(v) => (Some(v), None),
            Outcome::Failure(e) => (None, Some(e)),
        }
    }

    pub fn into_result(self) -> Result<T, ActionError> {
        self.into()
    }
}

impl<T> From<Result<T, ActionError>> for Outcome<T> {
    fn from(r: Result<T, ActionError>) -> Self {
        match r {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Failure(e),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, ActionError> {
    fn from(o: Outcome<T>) -> Self {
        match o {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(e),
        }
    }
}
