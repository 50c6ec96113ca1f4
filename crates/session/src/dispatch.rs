//! Runs commands off the loop. Each completion is posted back as one [`Msg`].
//!
//! Log lines are credit-limited: at most `log_cap` of them may sit in the loop
//! queue unhandled. The loop returns a credit through [`Dispatcher::ack`] for
//! every message it takes off the queue, so a slow loop stalls the forwarder,
//! which fills the bounded stream channel, which stalls the stream itself.

use std::sync::Arc;
use std::time::Instant;

use argonav_api::ArgoApi;
use argonav_ops::{open_log_stream, CancelHandle, LogChunk, LogRequest, DEFAULT_LOG_CHANNEL_CAP};
use metrics::{counter, histogram};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::msg::{Command, Msg, SyncOutcome};

/// The single live log subscription.
struct ActiveLog {
    stream_id: u64,
    cancel: CancelHandle,
    /// Lines the loop may still receive before the forwarder waits.
    credits: Arc<Semaphore>,
    forwarder: JoinHandle<()>,
}

impl ActiveLog {
    fn stop(self) {
        self.cancel.cancel();
        self.credits.close();
    }
}

pub struct Dispatcher {
    api: Arc<dyn ArgoApi>,
    tx: UnboundedSender<Msg>,
    log_cap: usize,
    active_log: Option<ActiveLog>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn ArgoApi>, tx: UnboundedSender<Msg>) -> Self {
        Self { api, tx, log_cap: DEFAULT_LOG_CHANNEL_CAP, active_log: None }
    }

    pub fn with_log_channel_cap(mut self, cap: usize) -> Self {
        self.log_cap = cap.max(1);
        self
    }

    /// Stream id of the running subscription, if any.
    pub fn active_log(&self) -> Option<u64> {
        self.active_log.as_ref().map(|a| a.stream_id)
    }

    /// Return the delivery credit of a message the loop has taken off its queue.
    /// Lines of a replaced or cancelled stream carry no credit back.
    pub fn ack(&self, msg: &Msg) {
        let stream_id = match msg {
            Msg::LogLine { stream_id, .. } | Msg::LogFailed { stream_id, .. } => *stream_id,
            _ => return,
        };
        if let Some(active) = self.active_log.as_ref().filter(|a| a.stream_id == stream_id) {
            active.credits.add_permits(1);
        }
    }

    pub fn dispatch(&mut self, cmds: Vec<Command>) {
        for cmd in cmds {
            match cmd {
                Command::StartLogStream { stream_id, request } => self.start_log(stream_id, request),
                Command::CancelLogStream { stream_id } => self.stop_log(stream_id),
                other => self.spawn(other),
            }
        }
    }

    fn spawn(&self, cmd: Command) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let kind = cmd.kind();
            let started = Instant::now();
            counter!("argonav_commands_total", 1, "kind" => kind);
            let msg = execute(api.as_ref(), cmd).await;
            let took_ms = started.elapsed().as_secs_f64() * 1000.0;
            histogram!("argonav_command_ms", took_ms, "kind" => kind);
            debug!(kind, took_ms, "command finished");
            if let Some(msg) = msg {
                // The loop has exited if this fails; nothing left to notify.
                let _ = tx.send(msg);
            }
        });
    }

    fn start_log(&mut self, stream_id: u64, request: LogRequest) {
        if let Some(prev) = self.active_log.take() {
            info!(stream_id = prev.stream_id, "replacing log subscription");
            prev.stop();
        }
        counter!("argonav_commands_total", 1, "kind" => "start_log_stream");
        let handle = open_log_stream(self.api.clone(), request, self.log_cap);
        let mut rx = handle.rx;
        let tx = self.tx.clone();
        let credits = Arc::new(Semaphore::new(self.log_cap));
        let available = credits.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                // Closed once the subscription is stopped.
                let Ok(permit) = available.acquire().await else {
                    return;
                };
                permit.forget();
                let msg = match chunk {
                    LogChunk::Line(line) => Msg::LogLine { stream_id, line },
                    LogChunk::Failed(error) => Msg::LogFailed { stream_id, error },
                };
                if tx.send(msg).is_err() {
                    return;
                }
            }
            let _ = tx.send(Msg::LogEnded { stream_id });
        });
        self.active_log = Some(ActiveLog { stream_id, cancel: handle.cancel, credits, forwarder });
    }

    /// Cancel the subscription if it is still the one named.
    fn stop_log(&mut self, stream_id: u64) {
        match self.active_log.take() {
            Some(active) if active.stream_id == stream_id => {
                info!(stream_id, "cancelling log subscription");
                active.stop();
            }
            other => self.active_log = other,
        }
    }

    /// Cancel everything still running. Called when the loop exits.
    pub fn shutdown(&mut self) {
        if let Some(active) = self.active_log.take() {
            active.forwarder.abort();
            active.stop();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Perform one command against the backend. Log stream commands are handled by the dispatcher.
pub async fn execute(api: &dyn ArgoApi, cmd: Command) -> Option<Msg> {
    let msg = match cmd {
        Command::LoadApplications { generation } => {
            Msg::AppsLoaded { generation, result: api.list_applications().await }
        }
        Command::LoadDetail { generation, name, hard } => {
            let result = api.refresh_application(&name, hard).await;
            Msg::DetailLoaded { generation, name, result }
        }
        Command::SyncBatch { ticket, targets, dry_run } => {
            let mut results = Vec::with_capacity(targets.len());
            for name in targets {
                let error = api.sync_application(&name, dry_run).await.err();
                info!(app = %name, dry_run, ok = error.is_none(), "sync");
                results.push(SyncOutcome { name, error });
            }
            Msg::SyncFinished { ticket, dry_run, results }
        }
        Command::LoadRevisions { ticket, name } => {
            Msg::RevisionsLoaded { ticket, result: api.list_revisions(&name).await }
        }
        Command::Rollback { ticket, name, revision_id } => {
            Msg::RollbackDone { ticket, result: api.rollback_application(&name, revision_id).await }
        }
        Command::Terminate { ticket, name } => {
            Msg::TerminateDone { ticket, result: api.terminate_operation(&name).await }
        }
        Command::Delete { ticket, name, cascade } => {
            Msg::DeleteDone { ticket, result: api.delete_application(&name, cascade).await }
        }
        Command::LoadChoices { ticket, projects } => {
            let projects = if projects { Some(api.list_projects().await) } else { None };
            let repositories = api.list_repositories().await;
            let clusters = api.list_clusters().await;
            Msg::ChoicesLoaded { ticket, projects, repositories, clusters }
        }
        Command::Create { ticket, spec } => Msg::CreateDone { ticket, result: api.create_application(&spec).await },
        Command::Update { ticket, spec } => Msg::UpdateDone { ticket, result: api.update_application(&spec).await },
        Command::LoadResource { ticket, app, reference } => {
            let live = api.get_resource(&app, &reference).await;
            let desired = api.get_manifests(&app).await;
            Msg::ResourceLoaded { ticket, live, desired }
        }
        Command::LoadEvents { ticket, app } => Msg::EventsLoaded { ticket, result: api.list_events(&app).await },
        Command::LoadDiff { ticket, app } => Msg::DiffLoaded { ticket, result: api.server_side_diff(&app).await },
        Command::StartLogStream { .. } | Command::CancelLogStream { .. } => return None,
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use argonav_api::{ApiError, Call, MockApi};
    use argonav_core::Application;
    use tokio::sync::mpsc;

    fn apps() -> Vec<Application> {
        ["a", "b", "c"]
            .into_iter()
            .map(|n| Application { name: n.into(), sync: "OutOfSync".into(), ..Default::default() })
            .collect()
    }

    #[tokio::test]
    async fn batch_runs_in_target_order_with_per_target_errors() {
        let api = MockApi::with_apps(apps());
        api.fail_on(|c| matches!(c, Call::SyncApplication { name, .. } if name == "a"), ApiError::Internal("boom".into()));
        let cmd = Command::SyncBatch { ticket: 1, targets: vec!["c".into(), "a".into()], dry_run: true };
        let Some(Msg::SyncFinished { results, dry_run, .. }) = execute(&api, cmd).await else {
            panic!("expected sync result");
        };
        assert!(dry_run);
        assert_eq!(results.iter().map(|r| (r.name.as_str(), r.is_ok())).collect::<Vec<_>>(), vec![("c", true), ("a", false)]);
        assert!(api.calls().iter().all(|c| !c.is_mutating()));
    }

    #[tokio::test]
    async fn log_commands_are_not_executed_here() {
        let api = MockApi::with_apps(apps());
        assert!(execute(&api, Command::CancelLogStream { stream_id: 1 }).await.is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn choices_skip_projects_for_edit() {
        let api = MockApi::demo();
        let Some(Msg::ChoicesLoaded { projects, repositories, .. }) =
            execute(&api, Command::LoadChoices { ticket: 3, projects: false }).await
        else {
            panic!("expected choices");
        };
        assert!(projects.is_none());
        assert!(repositories.is_ok());
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Msg>) -> Vec<Msg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn unhandled_log_lines_stay_within_channel_cap() {
        let mock = MockApi::with_apps(apps()).with_log_lines((0..5000).map(|i| format!("line {i}")));
        let api: Arc<dyn ArgoApi> = Arc::new(mock);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(api, tx).with_log_channel_cap(4);
        let request = LogRequest { app: "a".into(), pod: "a-0".into(), container: None, follow: true };
        dispatcher.dispatch(vec![Command::StartLogStream { stream_id: 1, request }]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 4);
        assert_eq!(queued[0], Msg::LogLine { stream_id: 1, line: "line 0".into() });

        for msg in &queued {
            dispatcher.ack(msg);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let next = drain(&mut rx);
        assert_eq!(next.len(), 4);
        assert_eq!(next[0], Msg::LogLine { stream_id: 1, line: "line 4".into() });
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn acks_for_a_replaced_stream_grant_nothing() {
        let api: Arc<dyn ArgoApi> = Arc::new(MockApi::with_apps(apps()).with_log_lines(["x", "y", "z"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(api, tx).with_log_channel_cap(1);
        let request = LogRequest { app: "a".into(), pod: "a-0".into(), container: None, follow: true };
        dispatcher.dispatch(vec![Command::StartLogStream { stream_id: 1, request: request.clone() }]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = drain(&mut rx);
        assert_eq!(first.len(), 1);

        dispatcher.dispatch(vec![Command::StartLogStream { stream_id: 2, request }]);
        dispatcher.ack(&first[0]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = drain(&mut rx);
        assert_eq!(second, vec![Msg::LogLine { stream_id: 2, line: "x".into() }]);
    }
}
