use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the rule store, the evaluation engine and the loader.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Malformed rule fields. Surfaced to the caller for correction,
    /// never retried.
    #[error("invalid rule: {0}")]
    Validation(String),

    /// The caller's role lacks rights for the requested operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Version mismatch on toggle/delete. The caller must re-fetch and
    /// retry; the store never retries on its own.
    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u32, actual: u32 },

    /// The key is absent. Distinct from `Conflict` so callers can tell a
    /// deletion race from an edit race.
    #[error("rule not found: {0}")]
    NotFound(Uuid),

    /// Transient backend failure while reading a snapshot. The only
    /// condition the engine retries internally.
    #[error("rule store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to read rules from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules from {path}: {message}")]
    Parse { path: String, message: String },
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RuleError::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        RuleError::Permission(message.into())
    }
}
