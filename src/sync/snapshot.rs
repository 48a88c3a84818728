//! Remote and local snapshots feeding the planner.
//!
//! [`RemoteSnapshotFetcher`] wraps the tracker calls a run needs and caches
//! scope listings fetched ahead of time. [`LocalSnapshotReader`] loads the
//! mirrored rows a scope's diff is computed against.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    Issue, IssueTypeInfo, RemoteIssue, RemoteProject, RemoteStatus, RemoteVersion, RemoteWorklog,
    Version, Worklog,
};
use crate::remote::{IssueQuery, RemoteError, RemoteTracker, SCOPE_PAGE_SIZE, SUBTASK_PAGE_SIZE};
use crate::storage::SqliteStorage;
use crate::sync::types::VersionScope;

/// Project metadata fetched at the start of a run.
#[derive(Debug, Clone)]
pub struct RemoteMetadata {
    pub project: RemoteProject,
    pub issue_types: Vec<IssueTypeInfo>,
    pub statuses: Vec<RemoteStatus>,
    pub versions: Vec<RemoteVersion>,
}

/// One remote issue together with its worklogs.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub issue: RemoteIssue,
    pub worklogs: Vec<RemoteWorklog>,
}

/// Read-only view of the tracker for one run.
pub struct RemoteSnapshotFetcher<'a> {
    tracker: &'a dyn RemoteTracker,
    project_key: String,
    listings: HashMap<VersionScope, Vec<RemoteIssue>>,
}

impl<'a> RemoteSnapshotFetcher<'a> {
    #[must_use]
    pub fn new(tracker: &'a dyn RemoteTracker, project_key: &str) -> Self {
        Self {
            tracker,
            project_key: project_key.to_string(),
            listings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    /// Fetch the project, its issue types, statuses and versions.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if the tracker has no such project, or the
    /// remote error of any failing call.
    pub fn fetch_metadata(&self) -> Result<RemoteMetadata> {
        let project = self.tracker.project(&self.project_key).map_err(|e| match e {
            RemoteError::NotFound(_) => Error::ProjectNotFound {
                key: self.project_key.clone(),
            },
            other => Error::Remote(other),
        })?;
        let issue_types = self.tracker.issue_types(&project.id)?;
        let statuses = self.tracker.statuses()?;
        let versions = self.tracker.versions(&project.key)?;

        debug!(
            project = %project.key,
            issue_types = issue_types.len(),
            statuses = statuses.len(),
            versions = versions.len(),
            "Fetched project metadata"
        );

        Ok(RemoteMetadata {
            project,
            issue_types,
            statuses,
            versions,
        })
    }

    /// The issues listed under `scope`, reusing a listing fetched ahead.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the search fails.
    pub fn scope_issues(&mut self, scope: &VersionScope) -> Result<Vec<RemoteIssue>> {
        if let Some(cached) = self.listings.remove(scope) {
            return Ok(cached);
        }
        self.search_scope(scope)
    }

    /// Which of `ids` are listed under one of `scopes`.
    ///
    /// Listings are fetched in order only until every id is accounted for,
    /// and kept for the later [`Self::scope_issues`] call.
    ///
    /// # Errors
    ///
    /// Returns the remote error if a search fails.
    pub fn find_in_scopes(
        &mut self,
        ids: &HashSet<i64>,
        scopes: &[VersionScope],
    ) -> Result<HashSet<i64>> {
        let mut found = HashSet::new();
        for scope in scopes {
            if found.len() == ids.len() {
                break;
            }
            if !self.listings.contains_key(scope) {
                let listing = self.search_scope(scope)?;
                self.listings.insert(scope.clone(), listing);
            }
            if let Some(listing) = self.listings.get(scope) {
                found.extend(listing.iter().map(|i| i.id).filter(|id| ids.contains(id)));
            }
        }
        Ok(found)
    }

    /// Fetch worklogs for every listed issue.
    ///
    /// # Errors
    ///
    /// Returns the remote error of the first failing fetch.
    pub fn with_worklogs(&self, issues: Vec<RemoteIssue>) -> Result<Vec<RemoteEntry>> {
        issues
            .into_iter()
            .map(|issue| {
                let worklogs = self.tracker.worklogs(&issue.key)?;
                Ok::<_, Error>(RemoteEntry { issue, worklogs })
            })
            .collect()
    }

    /// Keys of the direct subtasks of `parent_key`.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the search fails.
    pub fn subtask_keys(&self, parent_key: &str) -> Result<Vec<String>> {
        let query = IssueQuery::Subtasks {
            parent_key: parent_key.to_string(),
        };
        let subtasks = self.tracker.search_issues(&query, SUBTASK_PAGE_SIZE)?;
        Ok(subtasks.into_iter().map(|i| i.key).collect())
    }

    fn search_scope(&self, scope: &VersionScope) -> Result<Vec<RemoteIssue>> {
        let issues = self
            .tracker
            .search_issues(&scope.query(&self.project_key), SCOPE_PAGE_SIZE)?;
        debug!(version = %scope, issues = issues.len(), "Listed scope");
        Ok(issues)
    }
}

/// Mirrored rows relevant to one scope's diff.
#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    /// Issues currently assigned to the scope.
    pub existing: HashMap<i64, Issue>,
    /// Remotely listed issues mirrored under a different scope.
    pub elsewhere: HashMap<i64, Issue>,
    /// Mirrored worklogs whose ids appear remotely, whatever issue holds them.
    pub worklogs: HashMap<i64, Worklog>,
}

/// Read-only view of the mirror.
pub struct LocalSnapshotReader<'a> {
    storage: &'a SqliteStorage,
}

impl<'a> LocalSnapshotReader<'a> {
    #[must_use]
    pub const fn new(storage: &'a SqliteStorage) -> Self {
        Self { storage }
    }

    /// All mirrored versions by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn versions(&self) -> Result<HashMap<i64, Version>> {
        Ok(self
            .storage
            .list_versions()?
            .into_iter()
            .map(|v| (v.id, v))
            .collect())
    }

    /// Load the rows `entries` will be diffed against.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn scope(&self, scope: &VersionScope, entries: &[RemoteEntry]) -> Result<ScopeSnapshot> {
        let existing: HashMap<i64, Issue> = self
            .storage
            .issues_in_scope(scope.fix_version_id())?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let outside: Vec<i64> = entries
            .iter()
            .map(|e| e.issue.id)
            .filter(|id| !existing.contains_key(id))
            .collect();
        let elsewhere = self.storage.issues_by_ids(&outside)?;

        let worklog_ids: Vec<i64> = entries
            .iter()
            .flat_map(|e| e.worklogs.iter().filter_map(|w| w.id.as_scalar()))
            .collect();
        let worklogs = self.storage.worklogs_by_ids(&worklog_ids)?;

        Ok(ScopeSnapshot {
            existing,
            elsewhere,
            worklogs,
        })
    }

    /// Top-level issues mirrored under `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top_level(&self, scope: &VersionScope) -> Result<Vec<Issue>> {
        self.storage.top_level_issues_in_scope(scope.fix_version_id())
    }

    /// Look an issue up by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_key(&self, key: &str) -> Result<Option<Issue>> {
        self.storage.find_issue_by_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{BUG, FakeTracker, issue};

    fn scope(id: i64, name: &str) -> VersionScope {
        VersionScope::Version {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_missing_project_is_project_not_found() {
        let tracker = FakeTracker::new();
        let fetcher = RemoteSnapshotFetcher::new(&tracker, "NOPE");
        let err = fetcher.fetch_metadata().unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { ref key } if key == "NOPE"));
    }

    #[test]
    fn test_lookahead_listing_is_reused() {
        let tracker = FakeTracker::new()
            .with_version(10, "v1.0", false)
            .with_version(20, "v2.0", false)
            .with_version(30, "v3.0", false)
            .with_issue(issue(100, "PROJ-1", BUG, 1, &[20]))
            .with_issue(issue(101, "PROJ-2", BUG, 1, &[30]));
        let mut fetcher = RemoteSnapshotFetcher::new(&tracker, "PROJ");

        let later = [scope(20, "v2.0"), scope(30, "v3.0")];
        let found = fetcher
            .find_in_scopes(&HashSet::from([100]), &later)
            .unwrap();
        assert_eq!(found, HashSet::from([100]));
        // v3.0 was not needed to account for issue 100.
        assert_eq!(tracker.calls().len(), 1);

        tracker.clear_calls();
        let listing = fetcher.scope_issues(&scope(20, "v2.0")).unwrap();
        assert_eq!(listing.len(), 1);
        assert!(tracker.calls().is_empty());

        // Consumed: a second request goes back to the tracker.
        fetcher.scope_issues(&scope(20, "v2.0")).unwrap();
        assert_eq!(tracker.calls().len(), 1);
    }

    #[test]
    fn test_subtask_keys() {
        let tracker = FakeTracker::new()
            .with_issue(issue(200, "PROJ-2", BUG, 1, &[]))
            .with_subtasks("PROJ-2", &["PROJ-3", "PROJ-4"]);
        let fetcher = RemoteSnapshotFetcher::new(&tracker, "PROJ");

        assert_eq!(
            fetcher.subtask_keys("PROJ-2").unwrap(),
            vec!["PROJ-3".to_string(), "PROJ-4".to_string()]
        );
        assert_eq!(tracker.calls(), vec!["parent = \"PROJ-2\" order by id".to_string()]);
    }
}
