//! Sync command implementation.
//!
//! Resolves configuration, opens the mirror, runs one sync pass against the
//! tracker and prints the run report.

use colored::Colorize;

use crate::cli::Cli;
use crate::config::{ensure_db_dir, load_tracker_settings, resolve_actor, resolve_db_path};
use crate::error::{Error, Result};
use crate::remote::JiraClient;
use crate::storage::{MirrorCounts, SqliteStorage};
use crate::sync::{EntityStats, RunReport, ScopeFilter, SyncOptions, VersionOutcome, run_sync};

/// Execute a sync run.
///
/// # Errors
///
/// Returns the configuration, storage, remote or sync error that stopped the run.
pub fn execute(cli: &Cli, json: bool) -> Result<()> {
    if let Some(blank) = cli.versions.iter().find(|v| v.trim().is_empty()) {
        return Err(Error::InvalidArgument(format!(
            "version name must not be blank: {blank:?}"
        )));
    }

    let settings = load_tracker_settings(cli.config.as_deref(), cli.project.as_deref())?;

    let db_path = resolve_db_path(cli.db.as_deref())
        .ok_or_else(|| Error::config("Could not determine home directory", None))?;
    ensure_db_dir(&db_path)?;
    let mut storage = SqliteStorage::open(&db_path)?;

    let client = JiraClient::new(&settings.url, &settings.username, &settings.password)?;
    let options = SyncOptions {
        project_key: settings.project.clone(),
        actor: resolve_actor(cli.actor.as_deref(), &settings.username),
        filter: ScopeFilter::from_names(cli.versions.iter().cloned()),
    };

    let report = run_sync(&mut storage, &client, &options)?;
    let counts = storage.mirror_counts()?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "db": db_path.display().to_string(),
            "report": report,
            "mirror": counts,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if !cli.quiet {
        print_report(&report, &counts);
    }

    Ok(())
}

fn print_report(report: &RunReport, counts: &MirrorCounts) {
    let scope = if report.scope == "all" {
        "all versions".to_string()
    } else {
        report.scope.clone()
    };
    println!("{} {} ({scope})", "Synced".green().bold(), report.project.bold());
    println!();

    let width = report
        .versions
        .iter()
        .map(|v| v.name.len())
        .max()
        .unwrap_or(0);

    for version in &report.versions {
        match version.outcome {
            VersionOutcome::Synced => {
                let archived = if version.archived_now {
                    format!(" {}", "(archived)".yellow())
                } else {
                    String::new()
                };
                println!(
                    "  {:<width$}  {}  issues {}  worklogs {}{archived}",
                    version.name,
                    "synced".green(),
                    format_stats(&version.issues),
                    format_stats(&version.worklogs),
                );
            }
            VersionOutcome::Frozen => {
                println!("  {:<width$}  {}", version.name, "frozen".dimmed());
            }
            VersionOutcome::Filtered => {}
        }
    }

    println!();
    if report.statuses_changed > 0 {
        println!("  Statuses changed: {}", report.statuses_changed);
    }
    let missing = if report.links.missing > 0 {
        format!("{} missing", report.links.missing).yellow().to_string()
    } else {
        "0 missing".to_string()
    };
    println!(
        "  Links: {} linked, {} unchanged, {missing}",
        report.links.linked, report.links.unchanged
    );

    let issues = report.issue_totals();
    println!(
        "  Total: {} created, {} updated, {} moved, {} deleted, {} unchanged",
        issues.created, issues.updated, issues.moved, issues.deleted, issues.unchanged
    );
    println!(
        "  Mirror: {} versions, {} issues ({} linked), {} worklogs",
        counts.versions, counts.issues, counts.linked_issues, counts.worklogs
    );
    println!("  Run: {}", report.run_id.dimmed());
}

fn format_stats(stats: &EntityStats) -> String {
    let mut parts = Vec::new();
    if stats.created > 0 {
        parts.push(format!("+{}", stats.created).green().to_string());
    }
    if stats.updated > 0 {
        parts.push(format!("~{}", stats.updated));
    }
    if stats.moved > 0 {
        parts.push(format!(">{}", stats.moved).cyan().to_string());
    }
    if stats.deleted > 0 {
        parts.push(format!("-{}", stats.deleted).red().to_string());
    }
    if parts.is_empty() {
        format!("={}", stats.unchanged).dimmed().to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_stats_hides_zero_counts() {
        colored::control::set_override(false);
        let stats = EntityStats {
            created: 2,
            deleted: 1,
            unchanged: 5,
            ..EntityStats::default()
        };
        assert_eq!(format_stats(&stats), "+2 -1");
        assert_eq!(
            format_stats(&EntityStats {
                unchanged: 3,
                ..EntityStats::default()
            }),
            "=3"
        );
    }
}
