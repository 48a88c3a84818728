//! In-memory tracker used by the sync tests.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use super::{IssueQuery, RemoteError, RemoteResult, RemoteTracker, SCOPE_PAGE_SIZE};
use crate::model::{
    IssueTypeInfo, RawId, RemoteIssue, RemoteProject, RemoteStatus, RemoteVersion, RemoteWorklog,
};

pub(crate) const BUG: &str = "1";
pub(crate) const TASK: &str = "3";
pub(crate) const SUBTASK: &str = "5";

pub(crate) struct FakeTracker {
    pub project: RemoteProject,
    pub issue_types: Vec<IssueTypeInfo>,
    pub statuses: Vec<RemoteStatus>,
    pub versions: Vec<RemoteVersion>,
    pub issues: Vec<RemoteIssue>,
    pub worklogs: HashMap<String, Vec<RemoteWorklog>>,
    pub subtasks: HashMap<String, Vec<String>>,
    /// Issue key whose worklog fetch fails with a transport error.
    pub unreachable_worklogs: Option<String>,
    /// Version name whose listing ends short of its reported total.
    pub truncated_version: Option<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeTracker {
    pub(crate) fn new() -> Self {
        Self {
            project: RemoteProject {
                id: "10000".to_string(),
                key: "PROJ".to_string(),
            },
            issue_types: vec![
                issue_type(BUG, "Bug", false),
                issue_type(TASK, "Task", false),
                issue_type(SUBTASK, "Sub-task", true),
            ],
            statuses: vec![
                RemoteStatus {
                    id: 1,
                    name: "Open".to_string(),
                },
                RemoteStatus {
                    id: 5,
                    name: "Resolved".to_string(),
                },
            ],
            versions: Vec::new(),
            issues: Vec::new(),
            worklogs: HashMap::new(),
            subtasks: HashMap::new(),
            unreachable_worklogs: None,
            truncated_version: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with_version(mut self, id: i64, name: &str, archived: bool) -> Self {
        self.versions.push(version(id, name, archived));
        self
    }

    pub(crate) fn with_issue(mut self, issue: RemoteIssue) -> Self {
        self.issues.push(issue);
        self
    }

    pub(crate) fn with_worklog(mut self, issue_key: &str, worklog: RemoteWorklog) -> Self {
        self.worklogs
            .entry(issue_key.to_string())
            .or_default()
            .push(worklog);
        self
    }

    pub(crate) fn with_subtasks(mut self, parent_key: &str, keys: &[&str]) -> Self {
        self.subtasks.insert(
            parent_key.to_string(),
            keys.iter().map(|k| (*k).to_string()).collect(),
        );
        self
    }

    pub(crate) fn remove_issue(&mut self, id: i64) {
        self.issues.retain(|i| i.id != id);
    }

    pub(crate) fn issue_mut(&mut self, id: i64) -> &mut RemoteIssue {
        self.issues
            .iter_mut()
            .find(|i| i.id == id)
            .expect("fixture issue exists")
    }

    pub(crate) fn version_mut(&mut self, id: i64) -> &mut RemoteVersion {
        self.versions
            .iter_mut()
            .find(|v| v.id == id)
            .expect("fixture version exists")
    }

    /// Every call received, in order (JQL for searches).
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl RemoteTracker for FakeTracker {
    fn project(&self, key: &str) -> RemoteResult<RemoteProject> {
        self.record(format!("project:{key}"));
        if key == self.project.key {
            Ok(self.project.clone())
        } else {
            Err(RemoteError::NotFound(format!("project/{key}")))
        }
    }

    fn issue_types(&self, project_id: &str) -> RemoteResult<Vec<IssueTypeInfo>> {
        self.record(format!("issue_types:{project_id}"));
        Ok(self.issue_types.clone())
    }

    fn statuses(&self) -> RemoteResult<Vec<RemoteStatus>> {
        self.record("statuses".to_string());
        Ok(self.statuses.clone())
    }

    fn versions(&self, project_key: &str) -> RemoteResult<Vec<RemoteVersion>> {
        self.record(format!("versions:{project_key}"));
        Ok(self.versions.clone())
    }

    fn search_issues(
        &self,
        query: &IssueQuery,
        _page_size: u32,
    ) -> RemoteResult<Vec<RemoteIssue>> {
        self.record(query.to_jql());
        if let IssueQuery::FixVersion { version, .. } = query {
            if self.truncated_version.as_deref() == Some(version.as_str()) {
                return Err(RemoteError::Truncated {
                    what: query.to_jql(),
                    received: SCOPE_PAGE_SIZE as usize,
                    total: SCOPE_PAGE_SIZE as usize + 1,
                });
            }
        }
        let found: Vec<RemoteIssue> = match query {
            IssueQuery::FixVersion { version, .. } => {
                let ids: Vec<i64> = self
                    .versions
                    .iter()
                    .filter(|v| &v.name == version)
                    .map(|v| v.id)
                    .collect();
                self.issues
                    .iter()
                    .filter(|i| i.fix_versions.iter().any(|fv| ids.contains(fv)))
                    .cloned()
                    .collect()
            }
            IssueQuery::NoFixVersion { .. } => self
                .issues
                .iter()
                .filter(|i| i.fix_versions.is_empty())
                .cloned()
                .collect(),
            IssueQuery::Subtasks { parent_key } => self
                .subtasks
                .get(parent_key)
                .into_iter()
                .flatten()
                .map(|key| {
                    self.issues
                        .iter()
                        .find(|i| &i.key == key)
                        .cloned()
                        .unwrap_or_else(|| issue(-1, key, SUBTASK, 1, &[]))
                })
                .collect(),
        };
        Ok(found)
    }

    fn worklogs(&self, issue_key: &str) -> RemoteResult<Vec<RemoteWorklog>> {
        self.record(format!("worklogs:{issue_key}"));
        if self.unreachable_worklogs.as_deref() == Some(issue_key) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        Ok(self.worklogs.get(issue_key).cloned().unwrap_or_default())
    }
}

pub(crate) fn issue_type(id: &str, name: &str, is_subtask: bool) -> IssueTypeInfo {
    IssueTypeInfo {
        id: id.to_string(),
        name: name.to_string(),
        is_subtask,
    }
}

pub(crate) fn version(id: i64, name: &str, archived: bool) -> RemoteVersion {
    RemoteVersion {
        id,
        name: name.to_string(),
        release_date: None,
        archived,
    }
}

pub(crate) fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2011, 12, 1, 10, 0, 0).unwrap()
}

pub(crate) fn issue(
    id: i64,
    key: &str,
    type_id: &str,
    status_id: i64,
    fix_versions: &[i64],
) -> RemoteIssue {
    RemoteIssue {
        id,
        key: key.to_string(),
        type_id: type_id.to_string(),
        summary: format!("Summary of {key}"),
        assignee: None,
        created: created_at(),
        due_date: None,
        status_id,
        fix_versions: fix_versions.to_vec(),
    }
}

pub(crate) fn worklog(id: i64, author: &str, seconds: i64) -> RemoteWorklog {
    RemoteWorklog {
        id: RawId::Number(id),
        created: created_at(),
        author: author.to_string(),
        time_spent_seconds: seconds,
    }
}
