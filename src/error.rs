//! Error types for the mirror.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 6=sync, 9=remote, etc.)
//! - Retryability flags for schedulers re-running the mirror
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::sync::SyncError;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Wrappers match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    ProjectNotFound,
    RemoteNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Sync (exit 6)
    MalformedPayload,
    UnknownReference,
    InvalidTransition,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote (exit 9, 10)
    RemoteUnavailable,
    AuthFailed,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::RemoteNotFound => "REMOTE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::UnknownReference => "UNKNOWN_REFERENCE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::AuthFailed => "AUTH_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::ProjectNotFound | Self::RemoteNotFound => 3,
            Self::InvalidArgument => 4,
            Self::MalformedPayload | Self::UnknownReference | Self::InvalidTransition => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteUnavailable => 9,
            Self::AuthFailed => 10,
        }
    }

    /// Whether re-running the mirror unchanged may succeed.
    ///
    /// True for an unreachable tracker and a busy database. Versions that
    /// committed before the failure are not redone on the next run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable | Self::DatabaseError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while mirroring.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Project not found on tracker: {key}")]
    ProjectNotFound { key: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        /// Config file consulted, when one was.
        path: Option<PathBuf>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error tied to a config file.
    #[must_use]
    pub fn config(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Config {
            message: message.into(),
            path,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Remote(remote) => match remote {
                RemoteError::Transport(_)
                | RemoteError::Status { .. }
                | RemoteError::Truncated { .. } => ErrorCode::RemoteUnavailable,
                RemoteError::Auth(_) => ErrorCode::AuthFailed,
                RemoteError::NotFound(_) => ErrorCode::RemoteNotFound,
                RemoteError::Decode(_) => ErrorCode::MalformedPayload,
            },
            Self::Sync(sync) => match sync {
                SyncError::MalformedWorklog { .. } => ErrorCode::MalformedPayload,
                SyncError::UnknownIssueType { .. } | SyncError::UnknownStatus { .. } => {
                    ErrorCode::UnknownReference
                }
                SyncError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            },
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config { .. } => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ProjectNotFound { key } => Some(format!(
                "No project with key '{key}' is visible to the configured user. \
                 Check `project` in the config file or pass --project."
            )),

            Self::Config { path, .. } => Some(match path {
                Some(path) => format!(
                    "Edit {} (keys: url, username, password, project) \
                     or set JIRA_URL, JIRA_USERNAME, JIRA_PASSWORD, JIRA_PROJECT.",
                    path.display()
                ),
                None => "Set JIRA_URL, JIRA_USERNAME, JIRA_PASSWORD and JIRA_PROJECT, \
                         or create ~/.jiramirror/config.json."
                    .to_string(),
            }),

            Self::Remote(RemoteError::Auth(_)) => {
                Some("Check the username and password in the config file.".to_string())
            }
            Self::Remote(RemoteError::Transport(_) | RemoteError::Status { .. }) => Some(
                "The tracker could not be reached. Versions synced before the failure \
                 are kept; re-run to continue."
                    .to_string(),
            ),

            Self::Remote(RemoteError::Truncated { .. }) => Some(
                "The tracker stopped paging before the full listing arrived. Nothing \
                 from the affected version was written; re-run to continue."
                    .to_string(),
            ),

            Self::Sync(SyncError::MalformedWorklog { issue_key, .. }) => Some(format!(
                "The tracker returned a worklog id list for {issue_key} instead of a scalar id. \
                 Nothing from the failing version was written."
            )),
            Self::Sync(SyncError::UnknownIssueType { .. } | SyncError::UnknownStatus { .. }) => {
                Some(
                    "The tracker's metadata changed during the run. Re-run to refresh it."
                        .to_string(),
                )
            }

            Self::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                Some("Another process holds the mirror database. Retry shortly.".to_string())
            }

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Remote(_)
            | Self::Sync(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_map_to_distinct_exit_codes() {
        let transport = Error::Remote(RemoteError::Transport("reset".to_string()));
        let auth = Error::Remote(RemoteError::Auth("401".to_string()));
        let decode = Error::Remote(RemoteError::Decode("bad json".to_string()));

        assert_eq!(transport.exit_code(), 9);
        assert!(transport.error_code().is_retryable());
        assert_eq!(auth.exit_code(), 10);
        assert_eq!(decode.error_code(), ErrorCode::MalformedPayload);

        let truncated = Error::Remote(RemoteError::Truncated {
            what: "v1.0".to_string(),
            received: 1000,
            total: 1001,
        });
        assert_eq!(truncated.exit_code(), 9);
        assert!(truncated.error_code().is_retryable());
        assert!(truncated.hint().is_some());
    }

    #[test]
    fn test_malformed_worklog_is_sync_failure() {
        let err = Error::Sync(SyncError::MalformedWorklog {
            issue_key: "PROJ-7".to_string(),
            raw: "[1, 2]".to_string(),
        });
        assert_eq!(err.exit_code(), 6);
        assert!(!err.error_code().is_retryable());
        assert!(err.hint().unwrap().contains("PROJ-7"));
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::config("missing url", Some(PathBuf::from("/tmp/config.json")));
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "CONFIG_ERROR");
        assert_eq!(json["error"]["exit_code"], 7);
        assert!(
            json["error"]["hint"]
                .as_str()
                .unwrap()
                .contains("/tmp/config.json")
        );
    }

    #[test]
    fn test_other_has_no_hint() {
        let err = Error::Other("boom".to_string());
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_structured_json()["error"].get("hint").is_none());
    }
}
