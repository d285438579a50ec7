use thiserror::Error;

/// Error raised by a main or cleanup action. Opaque to the protocol.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical result for the protocol.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument '{name}': {value} (must be > 0)")]
    InvalidArgument { name: &'static str, value: i64 },

    /// The preallocation driver did not reach its suspend point.
    #[error("cleanup context setup failed: {0}")]
    Setup(String),

    #[error("main action failed: {0}")]
    MainAction(#[source] ActionError),

    #[error("cleanup action failed: {0}")]
    CleanupAction(#[source] ActionError),

    #[error("cleanup action attempted to suspend")]
    CleanupSuspended,

    #[error("cannot resume a completed context")]
    ContextDead,

    #[error("context was closed while suspended")]
    ContextClosed,

    #[error("calibration failed: {0}")]
    Calibration(String),
}

impl Error {
    /// The main action's error, when it is what this invocation surfaced.
    pub fn main_error(&self) -> Option<&ActionError> {
        match self {
            Error::MainAction(e) => Some(e),
            _ => None,
        }
    }

    /// The cleanup action's error, when it is what this invocation surfaced.
    pub fn cleanup_error(&self) -> Option<&ActionError> {
        match self {
            Error::CleanupAction(e) => Some(e),
            _ => None,
        }
    }

    /// Unwrap the action error carried by this error, if any.
    pub fn into_action_error(self) -> std::result::Result<ActionError, Error> {
        match self {
            Error::MainAction(e) | Error::CleanupAction(e) => Ok(e),
            other => Err(other),
        }
    }

    /// True when the cleanup action is the reason this invocation failed.
    pub fn is_cleanup_failure(&self) -> bool {
        matches!(self, Error::CleanupAction(_) | Error::CleanupSuspended)
    }
}
