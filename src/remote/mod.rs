//! Remote tracker boundary.
//!
//! The mirror only ever reads from the tracker. [`RemoteTracker`] is the
//! synchronous request/response contract the sync engine is written
//! against; [`jira::JiraClient`] implements it over the Jira REST API.

pub mod jira;

#[cfg(test)]
pub(crate) mod fake;

use crate::model::{
    IssueTypeInfo, RemoteIssue, RemoteProject, RemoteStatus, RemoteVersion, RemoteWorklog,
};

pub use jira::JiraClient;

/// Page size requested for version-scoped issue searches. Servers may cap it lower.
pub const SCOPE_PAGE_SIZE: u32 = 1000;

/// Page size for subtask searches during hierarchy linking.
pub const SUBTASK_PAGE_SIZE: u32 = 100;

/// Errors raised by a tracker transport.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The tracker could not be reached.
    #[error("Remote tracker unreachable: {0}")]
    Transport(String),

    /// Credentials were rejected.
    #[error("Remote tracker rejected credentials: {0}")]
    Auth(String),

    /// The requested entity does not exist remotely.
    #[error("Not found on remote tracker: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("Remote tracker returned HTTP {code} for {url}: {body}")]
    Status { code: u16, url: String, body: String },

    /// The response body could not be decoded.
    #[error("Unexpected remote payload: {0}")]
    Decode(String),

    /// A paged listing ended before reaching the total the tracker reported.
    #[error("Listing for {what} stopped at {received} of {total} results")]
    Truncated {
        what: String,
        received: usize,
        total: usize,
    },
}

/// Result type for tracker calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Issue search filters understood by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueQuery {
    /// Issues of `project` whose fix version is `version` (by name).
    FixVersion { project: String, version: String },
    /// Issues of `project` with no fix version.
    NoFixVersion { project: String },
    /// Direct subtasks of the issue with key `parent_key`.
    Subtasks { parent_key: String },
}

impl IssueQuery {
    /// Render the filter as a JQL expression.
    #[must_use]
    pub fn to_jql(&self) -> String {
        match self {
            Self::FixVersion { project, version } => format!(
                "project = {} and fixVersion = {} order by id",
                quote(project),
                quote(version)
            ),
            Self::NoFixVersion { project } => {
                format!("project = {} and fixVersion is EMPTY order by id", quote(project))
            }
            Self::Subtasks { parent_key } => {
                format!("parent = {} order by id", quote(parent_key))
            }
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Read-only access to the remote tracker.
///
/// Every call blocks until the tracker answers. Retries and backoff, if any,
/// belong to the implementation.
pub trait RemoteTracker {
    /// Look up the project by key.
    fn project(&self, key: &str) -> RemoteResult<RemoteProject>;

    /// All issue types (standard and subtask) available to the project.
    fn issue_types(&self, project_id: &str) -> RemoteResult<Vec<IssueTypeInfo>>;

    /// All workflow statuses.
    fn statuses(&self) -> RemoteResult<Vec<RemoteStatus>>;

    /// The project's versions in tracker order.
    fn versions(&self, project_key: &str) -> RemoteResult<Vec<RemoteVersion>>;

    /// Every issue matching `query`, requested `page_size` at a time.
    ///
    /// A listing that cannot be completed is an error, never a shorter result.
    fn search_issues(&self, query: &IssueQuery, page_size: u32) -> RemoteResult<Vec<RemoteIssue>>;

    /// Every worklog recorded against the issue.
    fn worklogs(&self, issue_key: &str) -> RemoteResult<Vec<RemoteWorklog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_version_jql() {
        let query = IssueQuery::FixVersion {
            project: "PROJ".to_string(),
            version: "v1.0".to_string(),
        };
        assert_eq!(
            query.to_jql(),
            "project = \"PROJ\" and fixVersion = \"v1.0\" order by id"
        );
    }

    #[test]
    fn test_no_fix_version_jql() {
        let query = IssueQuery::NoFixVersion {
            project: "PROJ".to_string(),
        };
        assert_eq!(
            query.to_jql(),
            "project = \"PROJ\" and fixVersion is EMPTY order by id"
        );
    }

    #[test]
    fn test_subtasks_jql_escapes_quotes() {
        let query = IssueQuery::Subtasks {
            parent_key: "PROJ-\"1".to_string(),
        };
        assert_eq!(query.to_jql(), "parent = \"PROJ-\\\"1\" order by id");
    }
}
