//! Data models for the mirror.
//!
//! Two families of types live here:
//! - [`local`]: rows as they are stored in the SQLite mirror
//! - [`remote`]: entities as the remote tracker reports them

pub mod local;
pub mod remote;

pub use local::{Issue, IssueFields, Status, Version, Worklog, WorklogFields};
pub use remote::{
    IssueTypeInfo, RawId, RemoteIssue, RemoteProject, RemoteStatus, RemoteVersion, RemoteWorklog,
};
