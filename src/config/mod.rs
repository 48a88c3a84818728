//! Configuration management.
//!
//! This module locates the mirror's directories, loads the tracker
//! credentials and resolves the database path.
//!
//! # Layout
//!
//! Everything lives under `~/.jiramirror/`:
//! - **Config**: `~/.jiramirror/config.json` with `url`, `username`, `password`, `project`
//! - **Database**: `~/.jiramirror/data/mirror.db`
//!
//! Environment variables (`JIRA_URL`, `JIRA_USERNAME`, `JIRA_PASSWORD`,
//! `JIRA_PROJECT`) take priority over the file.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Contents of `config.json`. Every field may be supplied by the environment instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default, alias = "uri")]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
}

/// Fully resolved tracker settings.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub project: String,
}

impl fmt::Debug for TrackerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("project", &self.project)
            .finish()
    }
}

impl MirrorConfig {
    /// Overlay values from the environment, looked up through `var`.
    ///
    /// Blank values are ignored.
    #[must_use]
    pub fn with_env<F>(self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |name: &str, current: Option<String>| {
            var(name).filter(|v| !v.trim().is_empty()).or(current)
        };
        Self {
            url: pick("JIRA_URL", self.url),
            username: pick("JIRA_USERNAME", self.username),
            password: pick("JIRA_PASSWORD", self.password),
            project: pick("JIRA_PROJECT", self.project),
        }
    }

    /// Check every required value is present.
    ///
    /// `project_override` (the `--project` flag) beats the configured project.
    /// `path` only feeds the error hint.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first missing key.
    pub fn resolve(
        self,
        project_override: Option<&str>,
        path: Option<&Path>,
    ) -> Result<TrackerSettings> {
        let require = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::config(format!("missing `{key}`"), path.map(Path::to_path_buf)))
        };

        Ok(TrackerSettings {
            url: require(self.url, "url")?,
            username: require(self.username, "username")?,
            password: require(self.password, "password")?,
            project: require(
                project_override.map(str::to_string).or(self.project),
                "project",
            )?,
        })
    }
}

/// Get the global mirror directory, `~/.jiramirror/`.
#[must_use]
pub fn global_mirror_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".jiramirror"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. If `explicit_path` is provided (`--config` or `JIRAMIRROR_CONFIG`), use it
/// 2. Global location: `~/.jiramirror/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    global_mirror_dir().map(|dir| dir.join("config.json"))
}

/// Load the config file. A missing file yields an empty config.
///
/// # Errors
///
/// Returns a config error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<MirrorConfig> {
    if !path.exists() {
        return Ok(MirrorConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file: {e}"), Some(path.to_path_buf()))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        Error::config(format!("Failed to parse config file: {e}"), Some(path.to_path_buf()))
    })
}

/// Load the config file, apply the process environment and resolve.
///
/// # Errors
///
/// Returns a config error if the file is unreadable or a value is missing.
pub fn load_tracker_settings(
    explicit_path: Option<&Path>,
    project_override: Option<&str>,
) -> Result<TrackerSettings> {
    let path = resolve_config_path(explicit_path);
    let config = match &path {
        Some(path) => load_config(path)?,
        None => MirrorConfig::default(),
    };
    config
        .with_env(|name| std::env::var(name).ok())
        .resolve(project_override, path.as_deref())
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `JIRAMIRROR_DB` environment variable
/// 3. Global location: `~/.jiramirror/data/mirror.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("JIRAMIRROR_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_mirror_dir().map(|dir| dir.join("data").join("mirror.db"))
}

/// Create the database's parent directory if needed.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Resolve the actor recorded on audit events.
///
/// Priority:
/// 1. `explicit` (`--actor` or `JIRAMIRROR_ACTOR`)
/// 2. The tracker username
#[must_use]
pub fn resolve_actor(explicit: Option<&str>, username: &str) -> String {
    explicit
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(username)
        .to_string()
}
