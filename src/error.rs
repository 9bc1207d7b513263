//! Error taxonomy shared by the store, the scheduler and the notifiers.

use std::fmt;

/// Errors surfaced by task operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Malformed or missing input, rejected before touching the store.
    #[error("invalid input: {0}")]
    Validation(String),

    /// No task with the given title.
    #[error("task '{title}' not found{}", Suggestion(.suggestion))]
    NotFound {
        title: String,
        suggestion: Option<String>,
    },

    /// The store could not be read or written right now.
    #[error("task store unavailable: {0}")]
    TransientStore(String),

    /// A notifier failed to deliver a reminder.
    #[error("reminder delivery failed: {0}")]
    NotifierDelivery(String),
}

impl From<rusqlite::Error> for TaskError {
    fn from(err: rusqlite::Error) -> Self {
        TaskError::TransientStore(err.to_string())
    }
}

impl TaskError {
    pub fn not_found(title: &str, suggestion: Option<String>) -> Self {
        TaskError::NotFound {
            title: title.to_string(),
            suggestion,
        }
    }
}

struct Suggestion<'a>(&'a Option<String>);

impl fmt::Display for Suggestion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(name) => write!(f, " (did you mean '{}'?)", name),
            None => Ok(()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
