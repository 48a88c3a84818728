//! Commit coordination.
//!
//! Each function applies one batch of decisions inside a single
//! [`SqliteStorage::mutate`] call: statuses, one version scope, or the whole
//! hierarchy pass. A failing statement rolls back the batch and leaves
//! earlier batches committed.

use crate::error::Result;
use crate::model::{RemoteStatus, Status, Version};
use crate::storage::events::EventType;
use crate::storage::sqlite::{
    delete_issue, insert_issue, insert_version, insert_worklog, set_issue_parent, update_issue,
    update_version, update_worklog, upsert_status,
};
use crate::storage::{MutationContext, SqliteStorage};
use crate::sync::types::{
    EntityStats, IssueDecision, LinkDecision, ScopePlan, VersionDecision, WorklogDecision,
};

/// What a committed scope batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedScope {
    pub issues: EntityStats,
    pub worklogs: EntityStats,
    pub archived_now: bool,
}

/// Upsert the tracker's statuses. Returns how many rows were created or renamed.
///
/// # Errors
///
/// Returns an error if a statement fails; nothing is written in that case.
pub fn apply_statuses(
    storage: &mut SqliteStorage,
    actor: &str,
    statuses: &[RemoteStatus],
) -> Result<usize> {
    storage.mutate("sync_statuses", actor, |tx, ctx| {
        let mut changed = 0;
        for remote in statuses {
            let status = Status {
                id: remote.id,
                name: remote.name.clone(),
            };
            if let Some(previous) = upsert_status(tx, &status)? {
                ctx.record_change(
                    "status",
                    &status.id.to_string(),
                    EventType::StatusChanged,
                    previous,
                    Some(status.name.clone()),
                );
                changed += 1;
            }
        }
        Ok(changed)
    })
}

/// Apply one scope's plan as a single transaction.
///
/// Deletes run first so a vanished issue's key is free for a new row, then
/// issue writes, then worklogs.
///
/// # Errors
///
/// Returns an error if a statement fails; the scope's prior state is kept.
pub fn apply_scope(
    storage: &mut SqliteStorage,
    actor: &str,
    plan: &ScopePlan,
) -> Result<AppliedScope> {
    let mut applied = AppliedScope {
        issues: EntityStats {
            unchanged: plan.unchanged_issues,
            ..EntityStats::default()
        },
        worklogs: EntityStats {
            unchanged: plan.unchanged_worklogs,
            ..EntityStats::default()
        },
        archived_now: false,
    };

    if plan.is_empty() {
        return Ok(applied);
    }

    storage.mutate("reconcile_version", actor, |tx, ctx| {
        if let Some(decision) = &plan.version {
            applied.archived_now = apply_version(tx, ctx, decision)?;
        }

        for decision in &plan.issues {
            if let IssueDecision::Delete { id, key } = decision {
                let worklogs = delete_issue(tx, *id)?;
                ctx.record_change(
                    "issue",
                    &id.to_string(),
                    EventType::IssueDeleted,
                    Some(key.clone()),
                    None,
                );
                applied.issues.deleted += 1;
                applied.worklogs.deleted += worklogs;
            }
        }

        for decision in &plan.issues {
            match decision {
                IssueDecision::Create { id, fields } => {
                    insert_issue(tx, *id, fields)?;
                    ctx.record_change(
                        "issue",
                        &id.to_string(),
                        EventType::IssueCreated,
                        None,
                        Some(fields.key.clone()),
                    );
                    applied.issues.created += 1;
                }
                IssueDecision::Update { id, fields } => {
                    update_issue(tx, *id, fields)?;
                    ctx.record_event("issue", &id.to_string(), EventType::IssueUpdated);
                    applied.issues.updated += 1;
                }
                IssueDecision::Move { id, from, fields } => {
                    update_issue(tx, *id, fields)?;
                    ctx.record_change(
                        "issue",
                        &id.to_string(),
                        EventType::IssueMoved,
                        from.map(|v| v.to_string()),
                        fields.fix_version_id.map(|v| v.to_string()),
                    );
                    applied.issues.moved += 1;
                }
                IssueDecision::Delete { .. } => {}
            }
        }

        for decision in &plan.worklogs {
            match decision {
                WorklogDecision::Create { id, fields } => {
                    insert_worklog(tx, *id, fields)?;
                    ctx.record_event("worklog", &id.to_string(), EventType::WorklogCreated);
                    applied.worklogs.created += 1;
                }
                WorklogDecision::Update { id, fields } => {
                    // The row may have gone with an issue deleted above.
                    if update_worklog(tx, *id, fields)? == 0 {
                        insert_worklog(tx, *id, fields)?;
                    }
                    ctx.record_event("worklog", &id.to_string(), EventType::WorklogUpdated);
                    applied.worklogs.updated += 1;
                }
            }
        }

        Ok(())
    })?;

    Ok(applied)
}

/// Returns true when the version was archived by this decision.
fn apply_version(
    tx: &rusqlite::Transaction<'_>,
    ctx: &mut MutationContext,
    decision: &VersionDecision,
) -> Result<bool> {
    match decision {
        VersionDecision::Create(version) => {
            insert_version(tx, version)?;
            ctx.record_change(
                "version",
                &version.id.to_string(),
                EventType::VersionCreated,
                None,
                Some(version.name.clone()),
            );
            Ok(false)
        }
        VersionDecision::Update { previous, current } => {
            update_version(tx, current)?;
            let archived_now = !previous.archived && current.archived;
            if archived_now {
                ctx.record_event("version", &current.id.to_string(), EventType::VersionArchived);
            }
            if attributes_changed(previous, current) {
                ctx.record_change(
                    "version",
                    &current.id.to_string(),
                    EventType::VersionUpdated,
                    Some(previous.name.clone()),
                    Some(current.name.clone()),
                );
            }
            Ok(archived_now)
        }
    }
}

fn attributes_changed(previous: &Version, current: &Version) -> bool {
    previous.name != current.name || previous.release_date != current.release_date
}

/// Write the hierarchy pass's parent links as one transaction.
///
/// # Errors
///
/// Returns an error if a statement fails; no link is written in that case.
pub fn apply_links(
    storage: &mut SqliteStorage,
    actor: &str,
    links: &[LinkDecision],
) -> Result<usize> {
    if links.is_empty() {
        return Ok(0);
    }

    storage.mutate("link_hierarchy", actor, |tx, ctx| {
        for link in links {
            set_issue_parent(tx, link.issue_id, link.parent_id)?;
            ctx.record_change(
                "issue",
                &link.issue_id.to_string(),
                EventType::IssueLinked,
                None,
                Some(link.parent_key.clone()),
            );
        }
        Ok(links.len())
    })
}
