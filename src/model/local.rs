//! Local row types for the mirror tables.
//!
//! Identifiers are the ones assigned by the remote tracker, never
//! generated locally. Timestamps are stored as Unix milliseconds and
//! calendar dates as `YYYY-MM-DD`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A project version (the fix-version scope issues are grouped by).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: i64,
    pub name: String,
    pub release_date: Option<NaiveDate>,
    /// One-way flag: once true locally it is never cleared by a sync.
    pub archived: bool,
}

/// Issue workflow status (reference data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub name: String,
}

/// A mirrored issue row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub key: String,
    pub issue_type: String,
    pub is_subtask: bool,
    pub summary: String,
    pub assignee: Option<String>,
    pub created_at: i64,
    pub due_date: Option<NaiveDate>,
    pub status_id: i64,
    pub fix_version_id: Option<i64>,
    /// Only ever written by the hierarchy pass.
    pub parent_id: Option<i64>,
}

impl Issue {
    /// The fields a reconciliation pass owns (everything except the id and
    /// the locally derived parent link).
    #[must_use]
    pub fn fields(&self) -> IssueFields {
        IssueFields {
            key: self.key.clone(),
            issue_type: self.issue_type.clone(),
            is_subtask: self.is_subtask,
            summary: self.summary.clone(),
            assignee: self.assignee.clone(),
            created_at: self.created_at,
            due_date: self.due_date,
            status_id: self.status_id,
            fix_version_id: self.fix_version_id,
        }
    }
}

/// Mutable issue attributes, as resolved from a remote issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFields {
    pub key: String,
    pub issue_type: String,
    pub is_subtask: bool,
    pub summary: String,
    pub assignee: Option<String>,
    pub created_at: i64,
    pub due_date: Option<NaiveDate>,
    pub status_id: i64,
    pub fix_version_id: Option<i64>,
}

/// A time-tracking entry attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worklog {
    pub id: i64,
    pub created_at: i64,
    pub author: String,
    pub time_spent_seconds: i64,
    pub issue_id: i64,
}

impl Worklog {
    #[must_use]
    pub fn fields(&self) -> WorklogFields {
        WorklogFields {
            created_at: self.created_at,
            author: self.author.clone(),
            time_spent_seconds: self.time_spent_seconds,
            issue_id: self.issue_id,
        }
    }
}

/// Worklog attributes overwritten on every sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorklogFields {
    pub created_at: i64,
    pub author: String,
    pub time_spent_seconds: i64,
    pub issue_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_fields_exclude_parent() {
        let issue = Issue {
            id: 100,
            key: "PROJ-1".to_string(),
            issue_type: "Bug".to_string(),
            is_subtask: false,
            summary: "Crash on start".to_string(),
            assignee: None,
            created_at: 1_000,
            due_date: None,
            status_id: 5,
            fix_version_id: Some(10),
            parent_id: Some(7),
        };

        let mut relinked = issue.clone();
        relinked.parent_id = None;

        assert_eq!(issue.fields(), relinked.fields());
        assert_eq!(issue.fields().fix_version_id, Some(10));
    }
}
