//! Tracker → mirror synchronization.
//!
//! One run mirrors a project in batch passes:
//!
//! - **Metadata**: issue types and statuses are fetched once into [`Lookups`];
//!   statuses are upserted first
//! - **Reconcile**: each version scope (plus the unscheduled bucket) is diffed
//!   against the mirror and committed as its own transaction
//! - **Link**: subtasks are attached to their parents once every scope exists
//!
//! # Architecture
//!
//! Diffing is pure: [`plan_version`] and [`plan_scope`] turn a remote snapshot
//! and the matching local rows into tagged decisions
//! ([`IssueDecision`], [`WorklogDecision`], [`VersionDecision`]). The
//! `commit` module applies a plan through [`SqliteStorage::mutate`], so a
//! failure rolls back at most one version's batch.
//!
//! # Example
//!
//! ```ignore
//! use jiramirror::sync::{run_sync, ScopeFilter, SyncOptions};
//!
//! let options = SyncOptions {
//!     project_key: "PROJ".to_string(),
//!     actor: "mirror".to_string(),
//!     filter: ScopeFilter::from_names(["v1.0"]),
//! };
//! let report = run_sync(&mut storage, &client, &options)?;
//! println!("{} issues created", report.issue_totals().created);
//! ```
//!
//! [`SqliteStorage::mutate`]: crate::storage::SqliteStorage::mutate

mod commit;
mod hierarchy;
mod lookup;
mod reconcile;
mod run;
mod snapshot;
mod types;

pub use commit::AppliedScope;
pub use hierarchy::{link_hierarchy, plan_links};
pub use lookup::Lookups;
pub use reconcile::{
    Reconciler, Reconciliation, ScopeInput, VersionStep, defers_to_later_scope, plan_scope,
    plan_version,
};
pub use run::{RunPhase, RunState, SyncOptions, run_sync};
pub use snapshot::{
    LocalSnapshotReader, RemoteEntry, RemoteMetadata, RemoteSnapshotFetcher, ScopeSnapshot,
};
pub use types::{
    EntityStats, IssueDecision, LinkDecision, LinkStats, RunReport, ScopeFilter, ScopePlan,
    SyncError, SyncResult, VersionDecision, VersionOutcome, VersionReport, VersionScope,
    WorklogDecision,
};
