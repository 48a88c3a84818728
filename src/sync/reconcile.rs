//! Version-by-version reconciliation.
//!
//! The diff is computed by two pure functions, [`plan_version`] and
//! [`plan_scope`], which turn a remote snapshot and the matching local rows
//! into tagged decisions. [`Reconciler`] drives them over the project's
//! versions and hands each scope's plan to the commit layer, one transaction
//! per version.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{IssueFields, RemoteIssue, RemoteVersion, Version, WorklogFields};
use crate::storage::SqliteStorage;
use crate::sync::commit;
use crate::sync::lookup::Lookups;
use crate::sync::run::{RunPhase, RunState};
use crate::sync::snapshot::{LocalSnapshotReader, RemoteEntry, RemoteSnapshotFetcher, ScopeSnapshot};
use crate::sync::types::{
    IssueDecision, ScopeFilter, ScopePlan, SyncError, SyncResult, VersionDecision,
    VersionOutcome, VersionReport, VersionScope, WorklogDecision,
};

/// How one remote version will be handled this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStep {
    pub scope: VersionScope,
    pub decision: Option<VersionDecision>,
    pub outcome: VersionOutcome,
}

/// Decide what happens to a remote version and whether its issues are synced.
///
/// A version is skipped without being recorded when the filter excludes it.
/// A version already archived locally is frozen unless named explicitly.
/// Otherwise the row is created or refreshed, `archived` only ever turning on.
#[must_use]
pub fn plan_version(
    local: Option<&Version>,
    remote: &RemoteVersion,
    filter: &ScopeFilter,
) -> VersionStep {
    let scope = VersionScope::Version {
        id: remote.id,
        name: remote.name.clone(),
    };

    if !filter.admits(&remote.name) {
        return VersionStep {
            scope,
            decision: None,
            outcome: VersionOutcome::Filtered,
        };
    }

    let decision = match local {
        Some(previous) if previous.archived && filter.is_all() => {
            return VersionStep {
                scope,
                decision: None,
                outcome: VersionOutcome::Frozen,
            };
        }
        Some(previous) => {
            let current = Version {
                id: remote.id,
                name: remote.name.clone(),
                release_date: remote.release_date,
                archived: previous.archived || remote.archived,
            };
            (&current != previous).then(|| VersionDecision::Update {
                previous: previous.clone(),
                current,
            })
        }
        None => Some(VersionDecision::Create(Version {
            id: remote.id,
            name: remote.name.clone(),
            release_date: remote.release_date,
            archived: remote.archived,
        })),
    };

    VersionStep {
        scope,
        decision,
        outcome: VersionOutcome::Synced,
    }
}

/// Everything [`plan_scope`] diffs.
pub struct ScopeInput<'a> {
    pub scope: &'a VersionScope,
    pub version: Option<VersionDecision>,
    /// Remote issues this scope owns, with their worklogs.
    pub entries: &'a [RemoteEntry],
    pub local: &'a ScopeSnapshot,
    /// Ids handled by a later scope of this run; never deleted here.
    pub carried_forward: &'a HashSet<i64>,
}

/// Compute the decisions bringing one scope in line with the remote listing.
///
/// # Errors
///
/// Returns `UnknownIssueType`/`UnknownStatus` for unresolvable references and
/// `MalformedWorklog` for a worklog id that is not a scalar.
pub fn plan_scope(input: &ScopeInput<'_>, lookups: &Lookups) -> SyncResult<ScopePlan> {
    let fix_version_id = input.scope.fix_version_id();
    let mut plan = ScopePlan {
        scope: input.scope.clone(),
        version: input.version.clone(),
        issues: Vec::new(),
        worklogs: Vec::new(),
        unchanged_issues: 0,
        unchanged_worklogs: 0,
    };
    let mut retained = HashSet::new();
    let mut planned_worklogs: HashMap<i64, usize> = HashMap::new();

    for entry in input.entries {
        let remote = &entry.issue;
        let fields = issue_fields(remote, fix_version_id, lookups)?;

        if let Some(existing) = input.local.existing.get(&remote.id) {
            retained.insert(remote.id);
            if existing.fields() == fields {
                plan.unchanged_issues += 1;
            } else {
                plan.issues.push(IssueDecision::Update {
                    id: remote.id,
                    fields,
                });
            }
        } else if let Some(moved) = input.local.elsewhere.get(&remote.id) {
            plan.issues.push(IssueDecision::Move {
                id: remote.id,
                from: moved.fix_version_id,
                fields,
            });
        } else {
            plan.issues.push(IssueDecision::Create {
                id: remote.id,
                fields,
            });
        }

        for worklog in &entry.worklogs {
            let id = worklog
                .id
                .as_scalar()
                .ok_or_else(|| SyncError::MalformedWorklog {
                    issue_key: remote.key.clone(),
                    raw: worklog.id.to_string(),
                })?;
            let fields = WorklogFields {
                created_at: worklog.created.timestamp_millis(),
                author: worklog.author.clone(),
                time_spent_seconds: worklog.time_spent_seconds,
                issue_id: remote.id,
            };

            if let Some(&slot) = planned_worklogs.get(&id) {
                // Listed twice: the later sighting wins.
                match &mut plan.worklogs[slot] {
                    WorklogDecision::Create { fields: f, .. }
                    | WorklogDecision::Update { fields: f, .. } => *f = fields,
                }
                continue;
            }

            let decision = match input.local.worklogs.get(&id) {
                Some(stored) if stored.fields() == fields => {
                    plan.unchanged_worklogs += 1;
                    continue;
                }
                Some(_) => WorklogDecision::Update { id, fields },
                None => WorklogDecision::Create { id, fields },
            };
            planned_worklogs.insert(id, plan.worklogs.len());
            plan.worklogs.push(decision);
        }
    }

    let mut vanished: Vec<_> = input
        .local
        .existing
        .values()
        .filter(|i| !retained.contains(&i.id) && !input.carried_forward.contains(&i.id))
        .collect();
    vanished.sort_by_key(|i| i.id);
    plan.issues.extend(vanished.into_iter().map(|i| IssueDecision::Delete {
        id: i.id,
        key: i.key.clone(),
    }));

    Ok(plan)
}

fn issue_fields(
    remote: &RemoteIssue,
    fix_version_id: Option<i64>,
    lookups: &Lookups,
) -> SyncResult<IssueFields> {
    let issue_type = lookups.issue_type(remote)?;
    let status_id = lookups.status(remote)?;
    Ok(IssueFields {
        key: remote.key.clone(),
        issue_type: issue_type.name.clone(),
        is_subtask: issue_type.is_subtask,
        summary: remote.summary.clone(),
        assignee: remote.assignee.clone(),
        created_at: remote.created.timestamp_millis(),
        due_date: remote.due_date,
        status_id,
        fix_version_id,
    })
}

/// Whether a listed issue belongs to a scope reconciled later in this run.
///
/// Issues with several fix versions end up under the last one processed.
#[must_use]
pub fn defers_to_later_scope(issue: &RemoteIssue, later_versions: &HashSet<i64>) -> bool {
    issue.fix_versions.iter().any(|id| later_versions.contains(id))
}

/// Outcome of reconciling every version.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Scopes whose issues were synced, in processing order.
    pub active: Vec<VersionScope>,
    pub reports: Vec<VersionReport>,
}

/// Drives the per-version diff and commit.
pub struct Reconciler<'s, 'r> {
    storage: &'s mut SqliteStorage,
    fetcher: &'s mut RemoteSnapshotFetcher<'r>,
    lookups: &'s Lookups,
    actor: &'s str,
}

impl<'s, 'r> Reconciler<'s, 'r> {
    pub fn new(
        storage: &'s mut SqliteStorage,
        fetcher: &'s mut RemoteSnapshotFetcher<'r>,
        lookups: &'s Lookups,
        actor: &'s str,
    ) -> Self {
        Self {
            storage,
            fetcher,
            lookups,
            actor,
        }
    }

    /// Reconcile the remote versions and the unscheduled bucket, in order.
    ///
    /// Each synced scope is committed before the next one is fetched, so a
    /// failure leaves earlier scopes in place.
    ///
    /// # Errors
    ///
    /// Returns the first remote, storage or sync error; the run stops there.
    pub fn reconcile(
        &mut self,
        remote_versions: &[RemoteVersion],
        filter: &ScopeFilter,
        state: &mut RunState,
    ) -> Result<Reconciliation> {
        if let ScopeFilter::Named(names) = filter {
            for name in names {
                if !remote_versions.iter().any(|v| &v.name == name) {
                    warn!(version = %name, "Version not found on tracker");
                }
            }
        }

        let local_versions = LocalSnapshotReader::new(self.storage).versions()?;
        let mut steps: Vec<VersionStep> = remote_versions
            .iter()
            .map(|remote| plan_version(local_versions.get(&remote.id), remote, filter))
            .collect();
        steps.push(VersionStep {
            scope: VersionScope::Unscheduled,
            decision: None,
            outcome: if filter.is_all() {
                VersionOutcome::Synced
            } else {
                VersionOutcome::Filtered
            },
        });

        let active: Vec<VersionScope> = steps
            .iter()
            .filter(|s| s.outcome == VersionOutcome::Synced)
            .map(|s| s.scope.clone())
            .collect();

        let mut reports = Vec::with_capacity(steps.len());
        let mut position = 0;
        for step in steps {
            match step.outcome {
                VersionOutcome::Filtered => {
                    debug!(version = %step.scope, "Skipping version outside filter");
                    reports.push(VersionReport::skipped(&step.scope, step.outcome));
                }
                VersionOutcome::Frozen => {
                    info!(version = %step.scope, "Skipping archived version");
                    reports.push(VersionReport::skipped(&step.scope, step.outcome));
                }
                VersionOutcome::Synced => {
                    state.advance(RunPhase::ReconcileVersion)?;
                    position += 1;
                    let later = &active[position..];
                    reports.push(self.reconcile_scope(step, later)?);
                }
            }
        }

        Ok(Reconciliation { active, reports })
    }

    fn reconcile_scope(&mut self, step: VersionStep, later: &[VersionScope]) -> Result<VersionReport> {
        let scope = step.scope;
        let later_versions: HashSet<i64> =
            later.iter().filter_map(VersionScope::fix_version_id).collect();

        let listing = self.fetcher.scope_issues(&scope)?;
        let listed: HashSet<i64> = listing.iter().map(|i| i.id).collect();
        let (owned, deferred): (Vec<RemoteIssue>, Vec<RemoteIssue>) = listing
            .into_iter()
            .partition(|i| !defers_to_later_scope(i, &later_versions));
        for issue in &deferred {
            debug!(version = %scope, issue = %issue.key, "Deferring issue to a later version");
        }

        let entries = self.fetcher.with_worklogs(owned)?;
        let local = LocalSnapshotReader::new(self.storage).scope(&scope, &entries)?;

        let mut carried_forward: HashSet<i64> = deferred.iter().map(|i| i.id).collect();
        let vanished: HashSet<i64> = local
            .existing
            .keys()
            .filter(|id| !listed.contains(*id))
            .copied()
            .collect();
        if !vanished.is_empty() {
            carried_forward.extend(self.fetcher.find_in_scopes(&vanished, later)?);
        }

        let plan = plan_scope(
            &ScopeInput {
                scope: &scope,
                version: step.decision,
                entries: &entries,
                local: &local,
                carried_forward: &carried_forward,
            },
            self.lookups,
        )?;

        for decision in &plan.issues {
            match decision {
                IssueDecision::Create { id, fields } => {
                    debug!(version = %scope, issue = %fields.key, id, "create");
                }
                IssueDecision::Update { id, fields } => {
                    debug!(version = %scope, issue = %fields.key, id, "update");
                }
                IssueDecision::Move { id, from, fields } => {
                    debug!(version = %scope, issue = %fields.key, id, from = ?from, "move");
                }
                IssueDecision::Delete { id, key } => {
                    debug!(version = %scope, issue = %key, id, "delete");
                }
            }
        }

        let applied = commit::apply_scope(self.storage, self.actor, &plan)?;

        info!(
            version = %scope,
            created = applied.issues.created,
            updated = applied.issues.updated,
            moved = applied.issues.moved,
            deleted = applied.issues.deleted,
            unchanged = applied.issues.unchanged,
            worklogs = applied.worklogs.changed(),
            "Reconciled version"
        );

        Ok(VersionReport {
            name: scope.to_string(),
            version_id: scope.fix_version_id(),
            outcome: VersionOutcome::Synced,
            archived_now: applied.archived_now,
            issues: applied.issues,
            worklogs: applied.worklogs,
        })
    }
}
