//! SQLite storage implementation.
//!
//! This module provides the storage backend for the mirror. Reads go through
//! [`SqliteStorage`] directly; writes go through [`SqliteStorage::mutate`],
//! which wraps a batch in one IMMEDIATE transaction and flushes the audit
//! events the batch recorded.

use crate::error::Result;
use crate::model::{Issue, IssueFields, Status, Version, Worklog, WorklogFields};
use crate::storage::events::{Event, EventType, insert_event};
use crate::storage::schema::apply_schema;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ISSUE_COLUMNS: &str = "id, key, issue_type, is_subtask, summary, assignee, created_at, due_date, status_id, fix_version_id, parent_id";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can record audit events, which are
/// written in the same transaction as the mutation itself.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(&self.op_name));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value)
                .with_comment(&self.op_name),
        );
    }
}

/// Row counts across the mirror tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MirrorCounts {
    pub versions: usize,
    pub statuses: usize,
    pub issues: usize,
    pub worklogs: usize,
    /// Issues with a parent link.
    pub linked_issues: usize,
}

/// One row of the run journal.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SyncRunRecord {
    pub id: String,
    pub scope: String,
    pub state: String,
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist. Writers
    /// wait up to five seconds for a lock held by another process.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        // Dropping `tx` on the error path rolls back.
        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Version Operations
    // ==================

    /// Get a version by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_version(&self, id: i64) -> Result<Option<Version>> {
        let version = self
            .conn
            .query_row(
                "SELECT id, name, release_date, archived FROM versions WHERE id = ?1",
                [id],
                map_version_row,
            )
            .optional()?;
        Ok(version)
    }

    /// List all mirrored versions ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_versions(&self) -> Result<Vec<Version>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, release_date, archived FROM versions ORDER BY id")?;
        let rows = stmt.query_map([], map_version_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // =================
    // Status Operations
    // =================

    /// List all statuses ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_statuses(&self) -> Result<Vec<Status>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM statuses ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Status {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ================
    // Issue Operations
    // ================

    /// Get an issue by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        let issue = self.conn.query_row(&sql, [id], map_issue_row).optional()?;
        Ok(issue)
    }

    /// Get an issue by its tracker key (e.g. `PROJ-1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_issue_by_key(&self, key: &str) -> Result<Option<Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE key = ?1");
        let issue = self.conn.query_row(&sql, [key], map_issue_row).optional()?;
        Ok(issue)
    }

    /// Issues whose fix version is `fix_version_id` (`None` = no version).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issues_in_scope(&self, fix_version_id: Option<i64>) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE fix_version_id IS ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([fix_version_id], map_issue_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Ids of the issues currently assigned to a fix-version scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issue_ids_in_scope(&self, fix_version_id: Option<i64>) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM issues WHERE fix_version_id IS ?1")?;
        let rows = stmt.query_map([fix_version_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Top-level (non-subtask) issues of a fix-version scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top_level_issues_in_scope(&self, fix_version_id: Option<i64>) -> Result<Vec<Issue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE fix_version_id IS ?1 AND is_subtask = 0
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([fix_version_id], map_issue_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Load the issues with the given ids, wherever they are scoped.
    ///
    /// Ids with no local row are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issues_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Issue>> {
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut found = HashMap::new();
        for id in ids {
            if let Some(issue) = stmt.query_row([id], map_issue_row).optional()? {
                found.insert(issue.id, issue);
            }
        }
        Ok(found)
    }

    // ==================
    // Worklog Operations
    // ==================

    /// Load the worklogs with the given ids, regardless of owning issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn worklogs_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Worklog>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, created_at, author, time_spent_seconds, issue_id FROM worklogs WHERE id = ?1",
        )?;
        let mut found = HashMap::new();
        for id in ids {
            if let Some(worklog) = stmt.query_row([id], map_worklog_row).optional()? {
                found.insert(worklog.id, worklog);
            }
        }
        Ok(found)
    }

    /// Worklogs attached to an issue, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn worklogs_for_issue(&self, issue_id: i64) -> Result<Vec<Worklog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, author, time_spent_seconds, issue_id
             FROM worklogs WHERE issue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([issue_id], map_worklog_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Row counts across the mirror tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn mirror_counts(&self) -> Result<MirrorCounts> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };

        Ok(MirrorCounts {
            versions: count("SELECT COUNT(*) FROM versions")?,
            statuses: count("SELECT COUNT(*) FROM statuses")?,
            issues: count("SELECT COUNT(*) FROM issues")?,
            worklogs: count("SELECT COUNT(*) FROM worklogs")?,
            linked_issues: count("SELECT COUNT(*) FROM issues WHERE parent_id IS NOT NULL")?,
        })
    }

    // ===========
    // Run Journal
    // ===========

    /// Record the start of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn begin_run(&mut self, run_id: &str, scope: &str, state: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_runs (id, scope, state, started_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![run_id, scope, state, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Record the terminal state of a sync run.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn finish_run(&mut self, run_id: &str, state: &str, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_runs SET state = ?2, error = ?3, finished_at = ?4 WHERE id = ?1",
            rusqlite::params![run_id, state, error, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_runs(&self, limit: u32) -> Result<Vec<SyncRunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scope, state, error, started_at, finished_at
             FROM sync_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(SyncRunRecord {
                id: row.get(0)?,
                scope: row.get(1)?,
                state: row.get(2)?,
                error: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

// ==========================================
// Statement helpers used inside `mutate`
// ==========================================

/// Insert a new version row.
pub(crate) fn insert_version(conn: &Connection, version: &Version) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO versions (id, name, release_date, archived) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            version.id,
            version.name,
            date_to_sql(version.release_date),
            version.archived,
        ],
    )?;
    Ok(())
}

/// Overwrite a version's attributes.
pub(crate) fn update_version(conn: &Connection, version: &Version) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE versions SET name = ?2, release_date = ?3, archived = ?4 WHERE id = ?1",
        rusqlite::params![
            version.id,
            version.name,
            date_to_sql(version.release_date),
            version.archived,
        ],
    )?;
    Ok(())
}

/// Insert or rename a status. Returns the previous name when the row changed
/// (`Some(None)` for a new row) and `None` when it was already current.
pub(crate) fn upsert_status(
    conn: &Connection,
    status: &Status,
) -> rusqlite::Result<Option<Option<String>>> {
    let previous: Option<String> = conn
        .query_row("SELECT name FROM statuses WHERE id = ?1", [status.id], |row| {
            row.get(0)
        })
        .optional()?;

    match previous {
        Some(name) if name == status.name => Ok(None),
        Some(name) => {
            conn.execute(
                "UPDATE statuses SET name = ?2 WHERE id = ?1",
                rusqlite::params![status.id, status.name],
            )?;
            Ok(Some(Some(name)))
        }
        None => {
            conn.execute(
                "INSERT INTO statuses (id, name) VALUES (?1, ?2)",
                rusqlite::params![status.id, status.name],
            )?;
            Ok(Some(None))
        }
    }
}

/// Insert a new issue row (without a parent link).
pub(crate) fn insert_issue(conn: &Connection, id: i64, fields: &IssueFields) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO issues (id, key, issue_type, is_subtask, summary, assignee, created_at, due_date, status_id, fix_version_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            id,
            fields.key,
            fields.issue_type,
            fields.is_subtask,
            fields.summary,
            fields.assignee,
            fields.created_at,
            date_to_sql(fields.due_date),
            fields.status_id,
            fields.fix_version_id,
        ],
    )?;
    Ok(())
}

/// Overwrite every reconciled field of an issue. `parent_id` is untouched.
pub(crate) fn update_issue(conn: &Connection, id: i64, fields: &IssueFields) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE issues SET key = ?2, issue_type = ?3, is_subtask = ?4, summary = ?5, assignee = ?6,
                created_at = ?7, due_date = ?8, status_id = ?9, fix_version_id = ?10
         WHERE id = ?1",
        rusqlite::params![
            id,
            fields.key,
            fields.issue_type,
            fields.is_subtask,
            fields.summary,
            fields.assignee,
            fields.created_at,
            date_to_sql(fields.due_date),
            fields.status_id,
            fields.fix_version_id,
        ],
    )?;
    Ok(())
}

/// Delete an issue; its worklogs go with it. Returns the number of worklogs removed.
pub(crate) fn delete_issue(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    let worklogs = conn.execute("DELETE FROM worklogs WHERE issue_id = ?1", [id])?;
    conn.execute("DELETE FROM issues WHERE id = ?1", [id])?;
    Ok(worklogs)
}

/// Insert a new worklog row.
pub(crate) fn insert_worklog(
    conn: &Connection,
    id: i64,
    fields: &WorklogFields,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO worklogs (id, created_at, author, time_spent_seconds, issue_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id,
            fields.created_at,
            fields.author,
            fields.time_spent_seconds,
            fields.issue_id,
        ],
    )?;
    Ok(())
}

/// Overwrite a worklog, reassigning it to `fields.issue_id`. Returns the rows touched.
pub(crate) fn update_worklog(
    conn: &Connection,
    id: i64,
    fields: &WorklogFields,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE worklogs SET created_at = ?2, author = ?3, time_spent_seconds = ?4, issue_id = ?5
         WHERE id = ?1",
        rusqlite::params![
            id,
            fields.created_at,
            fields.author,
            fields.time_spent_seconds,
            fields.issue_id,
        ],
    )
}

/// Point an issue at its parent.
pub(crate) fn set_issue_parent(
    conn: &Connection,
    issue_id: i64,
    parent_id: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE issues SET parent_id = ?2 WHERE id = ?1",
        rusqlite::params![issue_id, parent_id],
    )?;
    Ok(())
}

// ===========
// Row mapping
// ===========

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn date_from_sql(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn map_version_row(row: &Row) -> rusqlite::Result<Version> {
    Ok(Version {
        id: row.get(0)?,
        name: row.get(1)?,
        release_date: date_from_sql(row, 2)?,
        archived: row.get(3)?,
    })
}

fn map_issue_row(row: &Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        key: row.get(1)?,
        issue_type: row.get(2)?,
        is_subtask: row.get(3)?,
        summary: row.get(4)?,
        assignee: row.get(5)?,
        created_at: row.get(6)?,
        due_date: date_from_sql(row, 7)?,
        status_id: row.get(8)?,
        fix_version_id: row.get(9)?,
        parent_id: row.get(10)?,
    })
}

fn map_worklog_row(row: &Row) -> rusqlite::Result<Worklog> {
    Ok(Worklog {
        id: row.get(0)?,
        created_at: row.get(1)?,
        author: row.get(2)?,
        time_spent_seconds: row.get(3)?,
        issue_id: row.get(4)?,
    })
}
