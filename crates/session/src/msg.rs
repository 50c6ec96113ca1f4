//! Messages into the loop and commands out of it.
//!
//! Every command that leaves the loop comes back as exactly one [`Msg`]
//! (log streams excepted: they produce one message per line).

use argonav_api::ApiError;
use argonav_core::{AppSpec, Application, DiffResult, Event, ResourceRef, Revision};
use argonav_ops::LogRequest;

use crate::keys::Key;

/// Per-target result of a batch sync, in target order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub name: String,
    pub error: Option<ApiError>,
}

impl SyncOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Key(Key),
    Resize { width: u16, height: u16 },
    AppsLoaded { generation: u64, result: Result<Vec<Application>, ApiError> },
    DetailLoaded { generation: u64, name: String, result: Result<Application, ApiError> },
    SyncFinished { ticket: u64, dry_run: bool, results: Vec<SyncOutcome> },
    RevisionsLoaded { ticket: u64, result: Result<Vec<Revision>, ApiError> },
    RollbackDone { ticket: u64, result: Result<(), ApiError> },
    TerminateDone { ticket: u64, result: Result<(), ApiError> },
    DeleteDone { ticket: u64, result: Result<(), ApiError> },
    ChoicesLoaded {
        ticket: u64,
        projects: Option<Result<Vec<String>, ApiError>>,
        repositories: Result<Vec<String>, ApiError>,
        clusters: Result<Vec<String>, ApiError>,
    },
    CreateDone { ticket: u64, result: Result<(), ApiError> },
    UpdateDone { ticket: u64, result: Result<(), ApiError> },
    ResourceLoaded { ticket: u64, live: Result<String, ApiError>, desired: Result<Vec<String>, ApiError> },
    EventsLoaded { ticket: u64, result: Result<Vec<Event>, ApiError> },
    DiffLoaded { ticket: u64, result: Result<Vec<DiffResult>, ApiError> },
    LogLine { stream_id: u64, line: String },
    LogFailed { stream_id: u64, error: String },
    LogEnded { stream_id: u64 },
}

/// Side effects requested by a transition. Executed off the loop by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadApplications { generation: u64 },
    LoadDetail { generation: u64, name: String, hard: bool },
    /// One command, N sequential calls in target order.
    SyncBatch { ticket: u64, targets: Vec<String>, dry_run: bool },
    LoadRevisions { ticket: u64, name: String },
    Rollback { ticket: u64, name: String, revision_id: i64 },
    Terminate { ticket: u64, name: String },
    Delete { ticket: u64, name: String, cascade: bool },
    LoadChoices { ticket: u64, projects: bool },
    Create { ticket: u64, spec: AppSpec },
    Update { ticket: u64, spec: AppSpec },
    LoadResource { ticket: u64, app: String, reference: ResourceRef },
    LoadEvents { ticket: u64, app: String },
    LoadDiff { ticket: u64, app: String },
    StartLogStream { stream_id: u64, request: LogRequest },
    CancelLogStream { stream_id: u64 },
}

impl Command {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::LoadApplications { .. } => "load_applications",
            Command::LoadDetail { .. } => "load_detail",
            Command::SyncBatch { dry_run: true, .. } => "sync_dry_run",
            Command::SyncBatch { dry_run: false, .. } => "sync",
            Command::LoadRevisions { .. } => "load_revisions",
            Command::Rollback { .. } => "rollback",
            Command::Terminate { .. } => "terminate",
            Command::Delete { .. } => "delete",
            Command::LoadChoices { .. } => "load_choices",
            Command::Create { .. } => "create",
            Command::Update { .. } => "update",
            Command::LoadResource { .. } => "load_resource",
            Command::LoadEvents { .. } => "load_events",
            Command::LoadDiff { .. } => "load_diff",
            Command::StartLogStream { .. } => "start_log_stream",
            Command::CancelLogStream { .. } => "cancel_log_stream",
        }
    }

    /// True for commands that change server state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::SyncBatch { dry_run: false, .. }
                | Command::Rollback { .. }
                | Command::Terminate { .. }
                | Command::Delete { .. }
                | Command::Create { .. }
                | Command::Update { .. }
        )
    }
}
