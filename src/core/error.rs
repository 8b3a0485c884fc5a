//! Error types for the handoff buffer and its producer/consumer stages.

use std::fmt;
use std::time::Duration;

/// The buffer operation that was being attempted when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Inserting an item at the tail of the buffer
    Put,
    /// Removing an item from the head of the buffer
    Take,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Put => write!(f, "put"),
            Operation::Take => write!(f, "take"),
        }
    }
}

/// The main error type for the handoff system.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid construction parameters. Never recovered.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A `put` or `take` did not complete before its deadline
    #[error("Buffer {operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: Operation,
        duration_ms: u64,
    },

    /// A producer or consumer thread panicked
    #[error("Unit {unit} panicked")]
    Panicked { unit: String },

    /// The OS refused to start a unit thread
    #[error("Failed to spawn {unit}: {message}")]
    Spawn { unit: String, message: String },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),

    /// Several units failed in the same run
    #[error("Multiple errors occurred: {}", join_errors(.0))]
    Multiple(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("[{}]", e))
        .collect::<Vec<_>>()
        .join(", ")
}

// Convenience constructors
impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a timeout error for `operation` that waited `waited`
    pub fn timeout(operation: Operation, waited: Duration) -> Self {
        Error::Timeout {
            operation,
            duration_ms: millis(waited),
        }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this is the recoverable timeout category.
    ///
    /// A `Multiple` counts as a timeout when every error in it is one.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Multiple(errors) => !errors.is_empty() && errors.iter().all(Error::is_timeout),
            _ => false,
        }
    }

    /// Collapse a list of errors: none is `None`, one is itself, more is `Multiple`
    pub fn from_many(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }
}

#[cfg(feature = "async")]
impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            Error::Panicked {
                unit: "blocking buffer task".to_string(),
            }
        } else {
            Error::Custom(format!("Blocking task failed: {}", e))
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
