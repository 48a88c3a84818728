//! Sync types: scopes, per-entity decisions, reports and errors.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::model::{IssueFields, Version, WorklogFields};
use crate::remote::IssueQuery;
use crate::sync::run::RunPhase;

/// Which versions a run reconciles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScopeFilter {
    /// Every non-archived version plus the unscheduled bucket.
    #[default]
    All,
    /// Only the named versions, archived or not. The unscheduled bucket is skipped.
    Named(BTreeSet<String>),
}

impl ScopeFilter {
    /// Build a filter from CLI arguments. No names means [`ScopeFilter::All`].
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            Self::All
        } else {
            Self::Named(names)
        }
    }

    /// True when no version names were given.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Whether a version with this name passes the filter.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(names) => names.contains(name),
        }
    }

    /// Short description stored in the run journal.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Named(names) => names.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}

/// A fix-version scope: one version, or the unscheduled bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionScope {
    Version { id: i64, name: String },
    Unscheduled,
}

impl VersionScope {
    /// The `fix_version_id` issues in this scope carry.
    #[must_use]
    pub const fn fix_version_id(&self) -> Option<i64> {
        match self {
            Self::Version { id, .. } => Some(*id),
            Self::Unscheduled => None,
        }
    }

    /// The tracker query listing this scope's issues.
    #[must_use]
    pub fn query(&self, project_key: &str) -> IssueQuery {
        match self {
            Self::Version { name, .. } => IssueQuery::FixVersion {
                project: project_key.to_string(),
                version: name.clone(),
            },
            Self::Unscheduled => IssueQuery::NoFixVersion {
                project: project_key.to_string(),
            },
        }
    }
}

impl fmt::Display for VersionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { name, .. } => write!(f, "{name}"),
            Self::Unscheduled => write!(f, "(unscheduled)"),
        }
    }
}

/// What to do with a version row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
    Create(Version),
    /// Overwrite `previous` with `current`. `archived` never goes back to false.
    Update { previous: Version, current: Version },
}

/// What to do with one issue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueDecision {
    Create { id: i64, fields: IssueFields },
    Update { id: i64, fields: IssueFields },
    /// Reassign an issue mirrored under another scope, keeping its row.
    Move {
        id: i64,
        from: Option<i64>,
        fields: IssueFields,
    },
    Delete { id: i64, key: String },
}

/// What to do with one worklog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorklogDecision {
    Create { id: i64, fields: WorklogFields },
    Update { id: i64, fields: WorklogFields },
}

/// Every write one version scope needs, computed before any of them is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePlan {
    pub scope: VersionScope,
    pub version: Option<VersionDecision>,
    pub issues: Vec<IssueDecision>,
    pub worklogs: Vec<WorklogDecision>,
    pub unchanged_issues: usize,
    pub unchanged_worklogs: usize,
}

impl ScopePlan {
    /// True when applying the plan would not touch the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.issues.is_empty() && self.worklogs.is_empty()
    }
}

/// A parent link the hierarchy pass will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDecision {
    pub issue_id: i64,
    pub issue_key: String,
    pub parent_id: i64,
    pub parent_key: String,
}

/// Per-entity statistics for one scope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl EntityStats {
    /// Number of rows written.
    #[must_use]
    pub const fn changed(&self) -> usize {
        self.created + self.updated + self.moved + self.deleted
    }
}

/// Why a version was or wasn't reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOutcome {
    Synced,
    /// Archived locally and not named explicitly.
    Frozen,
    /// Excluded by the version-name filter.
    Filtered,
}

/// Result of one version scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReport {
    pub name: String,
    pub version_id: Option<i64>,
    pub outcome: VersionOutcome,
    /// Archived flag flipped during this run.
    pub archived_now: bool,
    pub issues: EntityStats,
    pub worklogs: EntityStats,
}

impl VersionReport {
    #[must_use]
    pub fn skipped(scope: &VersionScope, outcome: VersionOutcome) -> Self {
        Self {
            name: scope.to_string(),
            version_id: scope.fix_version_id(),
            outcome,
            archived_now: false,
            issues: EntityStats::default(),
            worklogs: EntityStats::default(),
        }
    }
}

/// Result of the hierarchy pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub linked: usize,
    pub unchanged: usize,
    /// Subtask keys with no local issue.
    pub missing: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub project: String,
    pub scope: String,
    pub statuses_changed: usize,
    pub versions: Vec<VersionReport>,
    pub links: LinkStats,
}

impl RunReport {
    /// Total issue statistics across synced versions.
    #[must_use]
    pub fn issue_totals(&self) -> EntityStats {
        sum(self.versions.iter().map(|v| v.issues))
    }

    /// Total worklog statistics across synced versions.
    #[must_use]
    pub fn worklog_totals(&self) -> EntityStats {
        sum(self.versions.iter().map(|v| v.worklogs))
    }

    /// Versions whose issues were reconciled.
    #[must_use]
    pub fn synced_versions(&self) -> usize {
        self.versions
            .iter()
            .filter(|v| v.outcome == VersionOutcome::Synced)
            .count()
    }
}

fn sum(stats: impl Iterator<Item = EntityStats>) -> EntityStats {
    stats.fold(EntityStats::default(), |acc, s| EntityStats {
        created: acc.created + s.created,
        updated: acc.updated + s.updated,
        moved: acc.moved + s.moved,
        deleted: acc.deleted + s.deleted,
        unchanged: acc.unchanged + s.unchanged,
    })
}

/// Sync-specific errors. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A worklog id arrived as a collection or a non-numeric value.
    #[error("Malformed worklog id on {issue_key}: {raw}")]
    MalformedWorklog { issue_key: String, raw: String },

    /// An issue references a type missing from the project's issue types.
    #[error("Issue {issue_key} has unknown issue type {type_id}")]
    UnknownIssueType { issue_key: String, type_id: String },

    /// An issue references a status missing from the status list.
    #[error("Issue {issue_key} has unknown status {status_id}")]
    UnknownStatus { issue_key: String, status_id: i64 },

    /// The run state machine was driven out of order.
    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
