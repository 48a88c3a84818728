//! Hierarchy linking.
//!
//! Runs after every scope has been reconciled: for each top-level issue in
//! the synced scopes, ask the tracker for its subtasks and point the local
//! subtask rows at it. All links are written in one transaction.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::SqliteStorage;
use crate::sync::commit;
use crate::sync::snapshot::{LocalSnapshotReader, RemoteSnapshotFetcher};
use crate::sync::types::{LinkDecision, LinkStats, VersionScope};

/// Compute the parent links for `scopes` without writing anything.
///
/// Subtasks missing locally are logged and counted, not treated as errors.
/// A link already in place produces no decision.
///
/// # Errors
///
/// Returns the first remote or storage error.
pub fn plan_links(
    reader: &LocalSnapshotReader<'_>,
    fetcher: &RemoteSnapshotFetcher<'_>,
    scopes: &[VersionScope],
) -> Result<(Vec<LinkDecision>, LinkStats)> {
    let mut links = Vec::new();
    let mut stats = LinkStats::default();

    for scope in scopes {
        for parent in reader.top_level(scope)? {
            for key in fetcher.subtask_keys(&parent.key)? {
                let Some(child) = reader.find_by_key(&key)? else {
                    warn!(version = %scope, parent = %parent.key, subtask = %key, "Can't find subtask locally");
                    stats.missing += 1;
                    continue;
                };

                if child.parent_id == Some(parent.id) {
                    stats.unchanged += 1;
                    continue;
                }

                debug!(parent = %parent.key, subtask = %child.key, "link");
                links.push(LinkDecision {
                    issue_id: child.id,
                    issue_key: child.key,
                    parent_id: parent.id,
                    parent_key: parent.key.clone(),
                });
            }
        }
    }

    stats.linked = links.len();
    Ok((links, stats))
}

/// Link subtasks to their parents across `scopes` and commit once.
///
/// # Errors
///
/// Returns the first remote or storage error; no link is written in that case.
pub fn link_hierarchy(
    storage: &mut SqliteStorage,
    fetcher: &RemoteSnapshotFetcher<'_>,
    actor: &str,
    scopes: &[VersionScope],
) -> Result<LinkStats> {
    let (links, stats) = plan_links(&LocalSnapshotReader::new(storage), fetcher, scopes)?;
    commit::apply_links(storage, actor, &links)?;

    info!(
        linked = stats.linked,
        unchanged = stats.unchanged,
        missing = stats.missing,
        "Linked hierarchy"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueFields, RemoteStatus};
    use crate::remote::fake::{BUG, FakeTracker, SUBTASK, issue};
    use crate::storage::sqlite::insert_issue;
    use crate::sync::commit::apply_statuses;

    fn unscheduled_issue(key: &str, is_subtask: bool) -> IssueFields {
        IssueFields {
            key: key.to_string(),
            issue_type: if is_subtask { "Sub-task" } else { "Bug" }.to_string(),
            is_subtask,
            summary: format!("Summary of {key}"),
            assignee: None,
            created_at: 0,
            due_date: None,
            status_id: 1,
            fix_version_id: None,
        }
    }

    fn storage_with(issues: &[(i64, &str, bool)]) -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        apply_statuses(
            &mut storage,
            "test",
            &[RemoteStatus {
                id: 1,
                name: "Open".to_string(),
            }],
        )
        .unwrap();
        storage
            .mutate("seed", "test", |tx, _ctx| {
                for (id, key, is_subtask) in issues {
                    insert_issue(tx, *id, &unscheduled_issue(key, *is_subtask))?;
                }
                Ok(())
            })
            .unwrap();
        storage
    }

    #[test]
    fn test_links_subtasks_to_parent() {
        let mut storage = storage_with(&[(200, "PROJ-2", false), (201, "PROJ-3", true)]);
        let tracker = FakeTracker::new()
            .with_issue(issue(200, "PROJ-2", BUG, 1, &[]))
            .with_issue(issue(201, "PROJ-3", SUBTASK, 1, &[]))
            .with_subtasks("PROJ-2", &["PROJ-3"]);
        let fetcher = RemoteSnapshotFetcher::new(&tracker, "PROJ");

        let stats =
            link_hierarchy(&mut storage, &fetcher, "test", &[VersionScope::Unscheduled]).unwrap();

        assert_eq!(stats.linked, 1);
        assert_eq!(storage.get_issue(201).unwrap().unwrap().parent_id, Some(200));

        // Second pass sees the link in place.
        let again =
            link_hierarchy(&mut storage, &fetcher, "test", &[VersionScope::Unscheduled]).unwrap();
        assert_eq!(again.linked, 0);
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn test_missing_subtask_is_counted_not_fatal() {
        let mut storage = storage_with(&[(200, "PROJ-2", false)]);
        let tracker = FakeTracker::new()
            .with_issue(issue(200, "PROJ-2", BUG, 1, &[]))
            .with_subtasks("PROJ-2", &["PROJ-3"]);
        let fetcher = RemoteSnapshotFetcher::new(&tracker, "PROJ");

        let stats =
            link_hierarchy(&mut storage, &fetcher, "test", &[VersionScope::Unscheduled]).unwrap();

        assert_eq!(stats.missing, 1);
        assert_eq!(stats.linked, 0);
        assert_eq!(storage.mirror_counts().unwrap().linked_issues, 0);
    }

    #[test]
    fn test_subtasks_are_not_queried_as_parents() {
        let storage = storage_with(&[(200, "PROJ-2", false), (201, "PROJ-3", true)]);
        let tracker = FakeTracker::new();
        let fetcher = RemoteSnapshotFetcher::new(&tracker, "PROJ");

        plan_links(
            &LocalSnapshotReader::new(&storage),
            &fetcher,
            &[VersionScope::Unscheduled],
        )
        .unwrap();

        assert_eq!(tracker.calls(), vec!["parent = \"PROJ-2\" order by id".to_string()]);
    }
}
