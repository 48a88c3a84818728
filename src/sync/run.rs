//! Run orchestration.
//!
//! A run moves through `Init → FetchMetadata → ReconcileVersion* →
//! LinkHierarchy → Done`, with `Failed` reachable from any non-terminal
//! phase. Each run is journaled in `sync_runs` when it starts and when it
//! ends.

use std::fmt;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::remote::RemoteTracker;
use crate::storage::SqliteStorage;
use crate::sync::commit;
use crate::sync::hierarchy;
use crate::sync::lookup::Lookups;
use crate::sync::reconcile::Reconciler;
use crate::sync::snapshot::RemoteSnapshotFetcher;
use crate::sync::types::{RunReport, ScopeFilter, SyncError, SyncResult};

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    FetchMetadata,
    ReconcileVersion,
    LinkHierarchy,
    Done,
    Failed,
}

impl RunPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FetchMetadata => "fetch_metadata",
            Self::ReconcileVersion => "reconcile_version",
            Self::LinkHierarchy => "link_hierarchy",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow this phase.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (_, Self::Failed)
            | (Self::Init, Self::FetchMetadata)
            | (
                Self::FetchMetadata | Self::ReconcileVersion,
                Self::ReconcileVersion | Self::LinkHierarchy,
            )
            | (Self::LinkHierarchy, Self::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase of one run.
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: RunPhase::Init,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `next` cannot follow the current phase.
    pub fn advance(&mut self, next: RunPhase) -> SyncResult<()> {
        if !self.phase.can_advance_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub project_key: String,
    /// Name recorded on audit events.
    pub actor: String,
    pub filter: ScopeFilter,
}

/// Mirror the project once.
///
/// # Errors
///
/// Returns the error that stopped the run. Scopes committed before it stay
/// committed; the journal row is marked `failed`.
pub fn run_sync(
    storage: &mut SqliteStorage,
    tracker: &dyn RemoteTracker,
    options: &SyncOptions,
) -> Result<RunReport> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut state = RunState::new();
    let scope = options.filter.describe();

    storage.begin_run(&run_id, &scope, state.phase().as_str())?;
    info!(run = %run_id, project = %options.project_key, scope = %scope, "Starting sync");

    match execute(storage, tracker, options, &run_id, &mut state) {
        Ok(report) => {
            storage.finish_run(&run_id, state.phase().as_str(), None)?;
            info!(run = %run_id, "Sync complete");
            Ok(report)
        }
        Err(err) => {
            let failed_in = state.phase();
            if let Err(transition) = state.advance(RunPhase::Failed) {
                warn!(run = %run_id, error = %transition, "Run state not marked failed");
            }
            error!(run = %run_id, phase = %failed_in, error = %err, "Sync failed");
            if let Err(journal) =
                storage.finish_run(&run_id, RunPhase::Failed.as_str(), Some(&err.to_string()))
            {
                warn!(run = %run_id, error = %journal, "Could not record failed run");
            }
            Err(err)
        }
    }
}

fn execute(
    storage: &mut SqliteStorage,
    tracker: &dyn RemoteTracker,
    options: &SyncOptions,
    run_id: &str,
    state: &mut RunState,
) -> Result<RunReport> {
    state.advance(RunPhase::FetchMetadata)?;
    let mut fetcher = RemoteSnapshotFetcher::new(tracker, &options.project_key);
    let metadata = fetcher.fetch_metadata()?;
    let lookups = Lookups::new(metadata.issue_types, &metadata.statuses);
    let statuses_changed = commit::apply_statuses(storage, &options.actor, &metadata.statuses)?;
    info!(
        issue_types = lookups.issue_type_count(),
        statuses = lookups.status_count(),
        statuses_changed,
        versions = metadata.versions.len(),
        "Loaded metadata"
    );

    let reconciliation = Reconciler::new(storage, &mut fetcher, &lookups, &options.actor)
        .reconcile(&metadata.versions, &options.filter, state)?;

    state.advance(RunPhase::LinkHierarchy)?;
    let links =
        hierarchy::link_hierarchy(storage, &fetcher, &options.actor, &reconciliation.active)?;

    state.advance(RunPhase::Done)?;
    Ok(RunReport {
        run_id: run_id.to_string(),
        project: metadata.project.key,
        scope: options.filter.describe(),
        statuses_changed,
        versions: reconciliation.reports,
        links,
    })
}
