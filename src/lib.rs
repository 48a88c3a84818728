//! jiramirror - a local relational mirror of a Jira project
//!
//! This crate provides the core functionality for the `jiramirror` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Version, Status, Issue, Worklog and their remote forms)
//! - [`remote`] - Tracker boundary and the Jira REST client
//! - [`storage`] - SQLite database layer
//! - [`sync`] - Reconciliation, commit coordination and hierarchy linking
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
