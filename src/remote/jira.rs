//! Jira REST API v2 client.
//!
//! Requests are made with `reqwest` and driven to completion on an owned
//! tokio runtime, so callers see a plain blocking API.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{IssueQuery, RemoteError, RemoteResult, RemoteTracker, SCOPE_PAGE_SIZE};
use crate::model::{
    IssueTypeInfo, RawId, RemoteIssue, RemoteProject, RemoteStatus, RemoteVersion, RemoteWorklog,
};

/// Fields requested for every issue search.
const SEARCH_FIELDS: &str = "issuetype,summary,assignee,created,duedate,status,fixVersions";

/// Blocking Jira client authenticated with HTTP basic auth.
pub struct JiraClient {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl JiraClient {
    /// Create a client for the Jira instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the async runtime cannot be started.
    pub fn new(base_url: &str, username: &str, password: &str) -> RemoteResult<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| RemoteError::Transport(format!("Failed to start runtime: {e}")))?;

        Ok(Self {
            runtime,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{path}", self.base_url)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> RemoteResult<T> {
        let url = self.api_url(path);
        debug!(%url, "GET");

        self.runtime.block_on(async {
            let response = self
                .client
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .query(query)
                .send()
                .await
                .map_err(|e| RemoteError::Transport(format!("{url}: {e}")))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RemoteError::Auth(format!("HTTP {} for {url}", status.as_u16())));
            }
            if status == StatusCode::NOT_FOUND {
                return Err(RemoteError::NotFound(url));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RemoteError::Status {
                    code: status.as_u16(),
                    url,
                    body,
                });
            }

            response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Decode(format!("{url}: {e}")))
        })
    }
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireProject {
    id: String,
    key: String,
    #[serde(default, rename = "issueTypes")]
    issue_types: Vec<WireIssueType>,
}

#[derive(Debug, Deserialize)]
struct WireIssueType {
    id: String,
    name: String,
    #[serde(default)]
    subtask: bool,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVersion {
    id: String,
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(default)]
    issues: Vec<WireIssue>,
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    id: String,
    key: String,
    fields: WireIssueFields,
}

#[derive(Debug, Deserialize)]
struct WireIssueFields {
    issuetype: WireRef,
    summary: Option<String>,
    assignee: Option<WireUser>,
    created: String,
    duedate: Option<String>,
    status: WireRef,
    #[serde(default, rename = "fixVersions")]
    fix_versions: Vec<WireRef>,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    name: Option<String>,
    account_id: Option<String>,
    display_name: Option<String>,
}

impl WireUser {
    fn into_login(self) -> Option<String> {
        self.name.or(self.account_id).or(self.display_name)
    }
}

#[derive(Debug, Deserialize)]
struct WireWorklogPage {
    #[serde(default)]
    worklogs: Vec<WireWorklog>,
    total: Option<usize>,
}

/// One page of a `startAt`-paged listing.
struct Page<T> {
    items: Vec<T>,
    /// Size of the whole listing. Absent means the page is the whole listing.
    total: Option<usize>,
}

/// Request pages from offset 0 until the reported total is collected.
///
/// The server decides the real page size. A page that comes back empty
/// while results are still owed fails with `Truncated`.
fn collect_pages<T, F>(what: &str, mut fetch: F) -> RemoteResult<Vec<T>>
where
    F: FnMut(usize) -> RemoteResult<Page<T>>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(items.len())?;
        let received = page.items.len();
        items.extend(page.items);

        let Some(total) = page.total else {
            return Ok(items);
        };
        if items.len() >= total {
            return Ok(items);
        }
        if received == 0 {
            return Err(RemoteError::Truncated {
                what: what.to_string(),
                received: items.len(),
                total,
            });
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireWorklog {
    id: RawId,
    created: String,
    author: Option<WireUser>,
    #[serde(default)]
    time_spent_seconds: i64,
}

fn parse_id(raw: &str, what: &str) -> RemoteResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| RemoteError::Decode(format!("{what} id is not numeric: {raw:?}")))
}

/// Parse a Jira timestamp such as `2011-12-01T10:00:00.000+0000`.
fn parse_timestamp(raw: &str) -> RemoteResult<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RemoteError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_date(raw: &str) -> RemoteResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| RemoteError::Decode(format!("bad date {raw:?}: {e}")))
}

fn convert_version(wire: WireVersion) -> RemoteResult<RemoteVersion> {
    Ok(RemoteVersion {
        id: parse_id(&wire.id, "version")?,
        name: wire.name,
        release_date: wire.release_date.as_deref().map(parse_date).transpose()?,
        archived: wire.archived,
    })
}

fn convert_issue(wire: WireIssue) -> RemoteResult<RemoteIssue> {
    let fields = wire.fields;
    Ok(RemoteIssue {
        id: parse_id(&wire.id, "issue")?,
        key: wire.key,
        type_id: fields.issuetype.id,
        summary: fields.summary.unwrap_or_default(),
        assignee: fields.assignee.and_then(WireUser::into_login),
        created: parse_timestamp(&fields.created)?,
        due_date: fields.duedate.as_deref().map(parse_date).transpose()?,
        status_id: parse_id(&fields.status.id, "status")?,
        fix_versions: fields
            .fix_versions
            .iter()
            .map(|v| parse_id(&v.id, "fix version"))
            .collect::<RemoteResult<_>>()?,
    })
}

fn convert_worklog(wire: WireWorklog) -> RemoteResult<RemoteWorklog> {
    Ok(RemoteWorklog {
        id: wire.id,
        created: parse_timestamp(&wire.created)?,
        author: wire
            .author
            .and_then(WireUser::into_login)
            .unwrap_or_default(),
        time_spent_seconds: wire.time_spent_seconds,
    })
}

impl RemoteTracker for JiraClient {
    fn project(&self, key: &str) -> RemoteResult<RemoteProject> {
        let wire: WireProject = self.get(&format!("project/{key}"), &[])?;
        Ok(RemoteProject {
            id: wire.id,
            key: wire.key,
        })
    }

    fn issue_types(&self, project_id: &str) -> RemoteResult<Vec<IssueTypeInfo>> {
        let wire: WireProject = self.get(&format!("project/{project_id}"), &[])?;
        Ok(wire
            .issue_types
            .into_iter()
            .map(|t| IssueTypeInfo {
                id: t.id,
                name: t.name,
                is_subtask: t.subtask,
            })
            .collect())
    }

    fn statuses(&self) -> RemoteResult<Vec<RemoteStatus>> {
        let wire: Vec<WireStatus> = self.get("status", &[])?;
        wire.into_iter()
            .map(|s| {
                Ok(RemoteStatus {
                    id: parse_id(&s.id, "status")?,
                    name: s.name,
                })
            })
            .collect()
    }

    fn versions(&self, project_key: &str) -> RemoteResult<Vec<RemoteVersion>> {
        let wire: Vec<WireVersion> = self.get(&format!("project/{project_key}/versions"), &[])?;
        wire.into_iter().map(convert_version).collect()
    }

    fn search_issues(&self, query: &IssueQuery, page_size: u32) -> RemoteResult<Vec<RemoteIssue>> {
        let jql = query.to_jql();
        debug!(%jql, page_size, "Searching issues");

        let issues = collect_pages(&jql, |start_at| {
            let wire: WireSearch = self.get(
                "search",
                &[
                    ("jql", jql.clone()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", page_size.to_string()),
                    ("fields", SEARCH_FIELDS.to_string()),
                ],
            )?;
            Ok(Page {
                items: wire.issues,
                total: wire.total,
            })
        })?;
        issues.into_iter().map(convert_issue).collect()
    }

    fn worklogs(&self, issue_key: &str) -> RemoteResult<Vec<RemoteWorklog>> {
        let path = format!("issue/{issue_key}/worklog");
        let worklogs = collect_pages(&path, |start_at| {
            let wire: WireWorklogPage = self.get(
                &path,
                &[
                    ("startAt", start_at.to_string()),
                    ("maxResults", SCOPE_PAGE_SIZE.to_string()),
                ],
            )?;
            Ok(Page {
                items: wire.worklogs,
                total: wire.total,
            })
        })?;
        worklogs.into_iter().map(convert_worklog).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_jira_timestamp() {
        let ts = parse_timestamp("2011-12-01T10:30:00.000+0200").unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.minute(), 30);
        assert_eq!(ts.day(), 1);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let ts = parse_timestamp("2011-12-01T10:30:00Z").unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn test_convert_issue_payload() {
        let payload = serde_json::json!({
            "id": "100",
            "key": "PROJ-1",
            "fields": {
                "issuetype": {"id": "1", "name": "Bug"},
                "summary": "Crash on start",
                "assignee": {"name": "alice", "displayName": "Alice"},
                "created": "2011-12-01T10:00:00.000+0000",
                "duedate": "2011-12-24",
                "status": {"id": "5", "name": "Resolved"},
                "fixVersions": [{"id": "10", "name": "v1.0"}]
            }
        });
        let wire: WireIssue = serde_json::from_value(payload).unwrap();
        let issue = convert_issue(wire).unwrap();

        assert_eq!(issue.id, 100);
        assert_eq!(issue.key, "PROJ-1");
        assert_eq!(issue.type_id, "1");
        assert_eq!(issue.assignee.as_deref(), Some("alice"));
        assert_eq!(issue.status_id, 5);
        assert_eq!(issue.fix_versions, vec![10]);
        assert_eq!(issue.due_date, NaiveDate::from_ymd_opt(2011, 12, 24));
    }

    #[test]
    fn test_convert_issue_without_optional_fields() {
        let payload = serde_json::json!({
            "id": "101",
            "key": "PROJ-2",
            "fields": {
                "issuetype": {"id": "3"},
                "summary": "Unscheduled",
                "assignee": null,
                "created": "2011-12-01T10:00:00.000+0000",
                "duedate": null,
                "status": {"id": "1"}
            }
        });
        let wire: WireIssue = serde_json::from_value(payload).unwrap();
        let issue = convert_issue(wire).unwrap();

        assert!(issue.assignee.is_none());
        assert!(issue.due_date.is_none());
        assert!(issue.fix_versions.is_empty());
    }

    #[test]
    fn test_convert_version_payload() {
        let wire: WireVersion = serde_json::from_value(serde_json::json!({
            "id": "10",
            "name": "v1.0",
            "releaseDate": "2012-01-15",
            "archived": true
        }))
        .unwrap();
        let version = convert_version(wire).unwrap();

        assert_eq!(version.id, 10);
        assert!(version.archived);
        assert_eq!(version.release_date, NaiveDate::from_ymd_opt(2012, 1, 15));
    }

    #[test]
    fn test_worklog_keeps_collection_id_raw() {
        let wire: WireWorklog = serde_json::from_value(serde_json::json!({
            "id": ["10001", "10002"],
            "created": "2011-12-01T10:00:00.000+0000",
            "author": {"name": "bob"},
            "timeSpentSeconds": 3600
        }))
        .unwrap();
        let worklog = convert_worklog(wire).unwrap();

        assert!(worklog.id.as_scalar().is_none());
        assert_eq!(worklog.author, "bob");
        assert_eq!(worklog.time_spent_seconds, 3600);
    }

    /// Serves `available` items, at most `cap` per request, claiming `total`.
    fn capped_server(
        available: usize,
        total: usize,
        cap: usize,
    ) -> impl FnMut(usize) -> RemoteResult<Page<usize>> {
        move |start_at| {
            let end = available.min(start_at + cap);
            Ok(Page {
                items: (start_at.min(end)..end).collect(),
                total: Some(total),
            })
        }
    }

    #[test]
    fn test_listing_is_paged_past_server_cap() {
        let items = collect_pages("search", capped_server(1001, 1001, 100)).unwrap();
        assert_eq!(items.len(), 1001);
        assert_eq!(items[0], 0);
        assert_eq!(items[1000], 1000);
    }

    #[test]
    fn test_listing_short_of_total_is_an_error() {
        // The tracker reports one issue more than it will ever serve.
        let err = collect_pages("v1.0", capped_server(1000, 1001, 1000)).unwrap_err();
        match err {
            RemoteError::Truncated {
                what,
                received,
                total,
            } => {
                assert_eq!(what, "v1.0");
                assert_eq!(received, 1000);
                assert_eq!(total, 1001);
            }
            other => panic!("expected truncated listing, got {other:?}"),
        }
    }

    #[test]
    fn test_listing_without_total_is_one_page() {
        let mut calls = 0;
        let items = collect_pages("worklogs", |_| {
            calls += 1;
            Ok(Page {
                items: vec![1, 2, 3],
                total: None,
            })
        })
        .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_search_page_reads_total() {
        let wire: WireSearch = serde_json::from_value(serde_json::json!({
            "startAt": 0,
            "maxResults": 100,
            "total": 250,
            "issues": []
        }))
        .unwrap();
        assert_eq!(wire.total, Some(250));
        assert!(wire.issues.is_empty());
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let client = JiraClient::new("https://jira.example.com/", "u", "p").unwrap();
        assert_eq!(
            client.api_url("status"),
            "https://jira.example.com/rest/api/2/status"
        );
    }
}
