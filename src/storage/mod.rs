//! SQLite storage layer for the mirror.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode and enforced foreign keys
//! - Transaction discipline for atomic per-batch writes
//! - Audit events for every applied mutation
//! - A run journal recording each sync invocation
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MirrorCounts, MutationContext, SqliteStorage, SyncRunRecord};
