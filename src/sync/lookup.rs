//! Per-run metadata lookups.
//!
//! Issue types and statuses are fetched once per run and frozen into
//! [`Lookups`], which the planner borrows for the rest of the run.

use std::collections::HashMap;

use crate::model::{IssueTypeInfo, RemoteIssue, RemoteStatus};
use crate::sync::types::{SyncError, SyncResult};

/// Issue type and status tables for one run.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    issue_types: HashMap<String, IssueTypeInfo>,
    statuses: HashMap<i64, String>,
}

impl Lookups {
    #[must_use]
    pub fn new(issue_types: Vec<IssueTypeInfo>, statuses: &[RemoteStatus]) -> Self {
        Self {
            issue_types: issue_types
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            statuses: statuses.iter().map(|s| (s.id, s.name.clone())).collect(),
        }
    }

    /// Resolve the issue's type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssueType` if the type id was not listed for the project.
    pub fn issue_type(&self, issue: &RemoteIssue) -> SyncResult<&IssueTypeInfo> {
        self.issue_types
            .get(&issue.type_id)
            .ok_or_else(|| SyncError::UnknownIssueType {
                issue_key: issue.key.clone(),
                type_id: issue.type_id.clone(),
            })
    }

    /// Check the issue's status against the status list.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStatus` if the status id was not listed.
    pub fn status(&self, issue: &RemoteIssue) -> SyncResult<i64> {
        if self.statuses.contains_key(&issue.status_id) {
            Ok(issue.status_id)
        } else {
            Err(SyncError::UnknownStatus {
                issue_key: issue.key.clone(),
                status_id: issue.status_id,
            })
        }
    }

    #[must_use]
    pub fn issue_type_count(&self) -> usize {
        self.issue_types.len()
    }

    #[must_use]
    pub fn status_count(&self) -> usize {
        self.statuses.len()
    }
}
