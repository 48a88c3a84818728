//! Entities as reported by the remote tracker.
//!
//! These are transport-neutral: the Jira client decodes its wire format
//! into them, and the test tracker builds them directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The project being mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    pub id: String,
    pub key: String,
}

/// Issue type metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTypeInfo {
    pub id: String,
    pub name: String,
    pub is_subtask: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub id: i64,
    pub name: String,
    pub release_date: Option<NaiveDate>,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIssue {
    pub id: i64,
    pub key: String,
    pub type_id: String,
    pub summary: String,
    pub assignee: Option<String>,
    pub created: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub status_id: i64,
    /// Ids of the issue's fix versions, in the order the tracker lists them.
    pub fix_versions: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWorklog {
    pub id: RawId,
    pub created: DateTime<Utc>,
    pub author: String,
    pub time_spent_seconds: i64,
}

/// An identifier exactly as it arrived on the wire.
///
/// Some transports surface scalar attributes as collections. The raw form is
/// kept so the reconciler can refuse it instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
    List(Vec<serde_json::Value>),
}

impl RawId {
    /// The numeric id, if this is a well-formed scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::List(_) => None,
        }
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "{}", serde_json::Value::Array(items.clone()))
            }
        }
    }
}
