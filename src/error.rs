//! Error types for the SMI-S array client
//!
//! Provides structured error types for resource resolution, job tracking,
//! identifier decoding and the masking-group lifecycle.

use crate::domain::model::JobState;
use thiserror::Error;

/// Unified error type for the client
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Resolution Errors
    // =========================================================================
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Ambiguous {service}: {count} instances found, expected exactly one")]
    AmbiguousService { service: String, count: usize },

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Malformed identifier or property: {0}")]
    Format(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Job Errors
    // =========================================================================
    #[error("{method} returned {return_code} but no job reference was present")]
    JobNotFound { method: String, return_code: u32 },

    #[error("Job finished in state {state}{}", description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    JobFailed {
        state: JobState,
        description: Option<String>,
    },

    #[error("Job still {last_state} after {polls} polls")]
    JobTimeout { last_state: JobState, polls: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{method} did not return the {name} output parameter")]
    MissingOutParameter { method: String, name: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Check if this error is transient
    ///
    /// Transient errors may succeed unchanged on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::JobTimeout { .. })
    }

    /// Check if this error is worth retrying at all
    ///
    /// Discovery misses are retryable (the array may not have caught up
    /// yet); malformed input and caller-side validation never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::JobTimeout { .. } | Error::NotFound { .. } => true,
            Error::JobFailed { state, .. } => *state == JobState::Terminated,
            _ => false,
        }
    }
}

/// Result type alias for the client
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let transient = Error::Transport("connection reset".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let missing = Error::not_found("StorageSystem", "000196701380");
        assert!(missing.is_retryable());
        assert!(!missing.is_transient());

        let invalid = Error::Validation("bad id type".into());
        assert!(!invalid.is_retryable());
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_job_failed_display() {
        let err = Error::JobFailed {
            state: JobState::Exception,
            description: Some("group is not empty".into()),
        };
        assert_eq!(
            err.to_string(),
            "Job finished in state EXCEPTION: group is not empty"
        );

        let err = Error::JobFailed {
            state: JobState::Killed,
            description: None,
        };
        assert_eq!(err.to_string(), "Job finished in state KILLED");
        assert!(!err.is_retryable());
    }
}
