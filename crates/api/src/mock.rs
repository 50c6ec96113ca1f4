//! In-memory backend. Serves the `--mock` demo and scripts failures for tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use argonav_core::{AppSpec, Application, DiffResult, Event, OperationState, Resource, ResourceRef, Revision, SyncHistoryEntry, SYNCED};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use futures::Stream;

use crate::{ApiError, ApiResult, ArgoApi, ByteStream};

/// One recorded backend call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListApplications,
    RefreshApplication { name: String, hard: bool },
    SyncApplication { name: String, dry_run: bool },
    ListRevisions(String),
    RollbackApplication { name: String, revision_id: i64 },
    TerminateOperation(String),
    DeleteApplication { name: String, cascade: bool },
    CreateApplication(AppSpec),
    UpdateApplication(AppSpec),
    ListProjects,
    ListRepositories,
    ListClusters,
    GetResource { app: String, reference: ResourceRef },
    GetManifests(String),
    ListEvents(String),
    PodLogs { app: String, pod: String, container: Option<String>, follow: bool },
    ServerSideDiff(String),
}

impl Call {
    /// True for calls that change server state.
    pub fn is_mutating(&self) -> bool {
        match self {
            Call::SyncApplication { dry_run, .. } => !dry_run,
            Call::RollbackApplication { .. }
            | Call::TerminateOperation(_)
            | Call::DeleteApplication { .. }
            | Call::CreateApplication(_)
            | Call::UpdateApplication(_) => true,
            _ => false,
        }
    }
}

type Matcher = Box<dyn Fn(&Call) -> bool + Send + Sync>;

#[derive(Default)]
struct MockState {
    apps: Vec<Application>,
    calls: Vec<Call>,
    failures: Vec<(Matcher, ApiError)>,
}

/// Scripted, deterministic [`ArgoApi`].
///
/// Mutations apply to the in-memory application set so a demo session behaves
/// plausibly. Every call is recorded; `fail_on` scripts errors per call.
pub struct MockApi {
    state: Mutex<MockState>,
    projects: Vec<String>,
    repositories: Vec<String>,
    clusters: Vec<String>,
    log_lines: Vec<String>,
    hold_logs_open: bool,
    logs_opened: Arc<AtomicUsize>,
    logs_released: Arc<AtomicUsize>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::with_apps(Vec::new())
    }
}

impl MockApi {
    pub fn with_apps(apps: Vec<Application>) -> Self {
        Self {
            state: Mutex::new(MockState { apps, ..Default::default() }),
            projects: vec!["default".into(), "platform".into()],
            repositories: vec!["https://github.com/example/ops".into(), "https://github.com/example/platform".into()],
            clusters: vec!["https://kubernetes.default.svc".into()],
            log_lines: Vec::new(),
            hold_logs_open: false,
            logs_opened: Arc::new(AtomicUsize::new(0)),
            logs_released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lines served by `pod_logs`.
    pub fn with_log_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Keep log streams open after the scripted lines, like a followed pod.
    pub fn hold_logs_open(mut self, hold: bool) -> Self {
        self.hold_logs_open = hold;
        self
    }

    /// Fail every call matching `matcher` with `err`. First matching script wins.
    pub fn fail_on<F>(&self, matcher: F, err: ApiError)
    where
        F: Fn(&Call) -> bool + Send + Sync + 'static,
    {
        self.lock().failures.push((Box::new(matcher), err));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn apps(&self) -> Vec<Application> {
        self.lock().apps.clone()
    }

    pub fn logs_opened(&self) -> usize {
        self.logs_opened.load(Ordering::SeqCst)
    }

    /// Log streams that have been dropped by their consumer.
    pub fn logs_released(&self) -> usize {
        self.logs_released.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and return the scripted failure, if any, with the state guard.
    fn record(&self, call: Call) -> ApiResult<MutexGuard<'_, MockState>> {
        let mut st = self.lock();
        let failure = st.failures.iter().find(|(m, _)| m(&call)).map(|(_, e)| e.clone());
        st.calls.push(call);
        match failure {
            Some(e) => Err(e),
            None => Ok(st),
        }
    }

    /// Demo data set used by `--mock`.
    pub fn demo() -> Self {
        let svc = "https://kubernetes.default.svc";
        let res = |group: &str, kind: &str, version: &str, name: &str, ns: &str, status: &str, health: &str| Resource {
            group: group.into(),
            kind: kind.into(),
            version: version.into(),
            name: name.into(),
            namespace: ns.into(),
            status: status.into(),
            health: health.into(),
            hook: false,
        };
        let history = vec![
            SyncHistoryEntry { id: 1, revision: "c0ffee".into(), deployed_at: "2026-01-20T18:00:00Z".into(), source: String::new() },
            SyncHistoryEntry { id: 2, revision: "deadbeef".into(), deployed_at: "2026-01-28T09:15:00Z".into(), source: String::new() },
            SyncHistoryEntry { id: 3, revision: "f00dbabe".into(), deployed_at: "2026-02-01T12:34:56Z".into(), source: String::new() },
        ];
        let app = |name: &str, ns: &str, project: &str, health: &str, sync: &str, repo: &str, path: &str, rev: &str| Application {
            name: name.into(),
            namespace: ns.into(),
            project: project.into(),
            health: health.into(),
            sync: sync.into(),
            repo_url: repo.into(),
            revision: rev.into(),
            path: path.into(),
            cluster: svc.into(),
            history: history.clone(),
            ..Default::default()
        };
        let platform = "https://github.com/example/platform";
        let ops = "https://github.com/example/ops";

        let mut payments = app("payments-api", "payments", "default", "Healthy", "Synced", platform, "apps/payments", "main");
        payments.resources = vec![
            res("apps", "Deployment", "v1", "payments-api", "payments", "Synced", "Healthy"),
            res("", "Service", "v1", "payments-api", "payments", "Synced", "Healthy"),
            res("", "ConfigMap", "v1", "payments-config", "payments", "Synced", "Healthy"),
            res("", "Pod", "v1", "payments-api-7d9f8-abcde", "payments", "", "Healthy"),
        ];

        let mut orders = app("orders-worker", "orders", "default", "Progressing", "Synced", platform, "apps/orders", "main");
        orders.operation_state = Some(OperationState { phase: "Running".into(), message: "syncing".into() });
        orders.resources = vec![
            res("apps", "Deployment", "v1", "orders-worker", "orders", "Synced", "Progressing"),
            res("batch", "CronJob", "v1", "orders-reconciler", "orders", "Synced", "Healthy"),
            res("", "Pod", "v1", "orders-worker-5c6b7-xyz12", "orders", "", "Progressing"),
        ];

        let mut web = app("web-frontend", "web", "default", "Healthy", "OutOfSync", platform, "apps/web", "main");
        web.resources = vec![
            res("apps", "Deployment", "v1", "web-frontend", "web", "OutOfSync", "Healthy"),
            res("", "Service", "v1", "web-frontend", "web", "Synced", "Healthy"),
            res("networking.k8s.io", "Ingress", "v1", "web", "web", "OutOfSync", "Healthy"),
            res("", "Secret", "v1", "web-tls", "web", "OutOfSync", ""),
        ];

        let mut observability = app("observability", "ops", "platform", "Degraded", "Synced", ops, "apps/observability", "main");
        let mut migrate = res("batch", "Job", "v1", "migrate-dashboards", "ops", "Synced", "Healthy");
        migrate.hook = true;
        observability.resources = vec![
            res("apps", "StatefulSet", "v1", "loki", "ops", "Synced", "Degraded"),
            res("apps", "Deployment", "v1", "grafana", "ops", "Synced", "Healthy"),
            res("", "Service", "v1", "grafana", "ops", "Synced", "Healthy"),
            migrate,
        ];

        let mut addons = app("cluster-addons", "kube-system", "platform", "Missing", "Unknown", ops, "clusters/dev/addons", "v1.2.3");
        addons.resources = vec![
            res("apps", "DaemonSet", "v1", "node-exporter", "kube-system", "Unknown", "Missing"),
            res("rbac.authorization.k8s.io", "ClusterRole", "v1", "addons-read", "", "Unknown", ""),
        ];

        Self::with_apps(vec![payments, orders, web, observability, addons])
            .with_log_lines(["starting...", "listening on :8080", "GET /healthz 200"])
    }
}

fn not_found(name: &str) -> ApiError {
    ApiError::NotFound(format!("application not found: {}", name))
}

fn find<'a>(apps: &'a [Application], name: &str) -> ApiResult<&'a Application> {
    apps.iter().find(|a| a.name == name).ok_or_else(|| not_found(name))
}

fn find_mut<'a>(apps: &'a mut [Application], name: &str) -> ApiResult<&'a mut Application> {
    apps.iter_mut().find(|a| a.name == name).ok_or_else(|| not_found(name))
}

fn render_manifest(r: &ResourceRef) -> String {
    let api_version = match (r.group.as_str(), r.version.as_str()) {
        ("", "") => "v1".to_string(),
        (g, "") => format!("{}/v1", g),
        ("", v) => v.to_string(),
        (g, v) => format!("{}/{}", g, v),
    };
    let ns = if r.namespace.is_empty() { String::new() } else { format!("\n  namespace: {}", r.namespace) };
    format!("apiVersion: {}\nkind: {}\nmetadata:\n  name: {}{}\nspec: {{}}\nstatus: {{}}\n", api_version, r.kind, r.name, ns)
}

/// Byte stream that counts itself released when dropped.
struct TrackedStream {
    inner: ByteStream,
    released: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = ApiResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ArgoApi for MockApi {
    async fn list_applications(&self) -> ApiResult<Vec<Application>> {
        let st = self.record(Call::ListApplications)?;
        Ok(st.apps.clone())
    }

    async fn refresh_application(&self, name: &str, hard: bool) -> ApiResult<Application> {
        let st = self.record(Call::RefreshApplication { name: name.into(), hard })?;
        find(&st.apps, name).cloned()
    }

    async fn sync_application(&self, name: &str, dry_run: bool) -> ApiResult<()> {
        let mut st = self.record(Call::SyncApplication { name: name.into(), dry_run })?;
        let app = find_mut(&mut st.apps, name)?;
        if !dry_run {
            app.sync = SYNCED.into();
            for r in app.resources.iter_mut().filter(|r| r.is_drifted()) {
                r.status = SYNCED.into();
            }
        }
        Ok(())
    }

    async fn list_revisions(&self, name: &str) -> ApiResult<Vec<Revision>> {
        let st = self.record(Call::ListRevisions(name.into()))?;
        find(&st.apps, name)?;
        Ok(vec![
            Revision { id: 3, revision: "f00dbabe".into(), author: "alice".into(), date: "2026-02-01T12:34:56Z".into(), message: "bump image tag".into() },
            Revision { id: 2, revision: "deadbeef".into(), author: "bob".into(), date: "2026-01-28T09:15:00Z".into(), message: "fix values".into() },
            Revision { id: 1, revision: "c0ffee".into(), author: "ci".into(), date: "2026-01-20T18:00:00Z".into(), message: "initial deploy".into() },
        ])
    }

    async fn rollback_application(&self, name: &str, revision_id: i64) -> ApiResult<()> {
        let mut st = self.record(Call::RollbackApplication { name: name.into(), revision_id })?;
        find_mut(&mut st.apps, name)?.sync = "OutOfSync".into();
        Ok(())
    }

    async fn terminate_operation(&self, name: &str) -> ApiResult<()> {
        let mut st = self.record(Call::TerminateOperation(name.into()))?;
        find_mut(&mut st.apps, name)?.operation_state = None;
        Ok(())
    }

    async fn delete_application(&self, name: &str, cascade: bool) -> ApiResult<()> {
        let mut st = self.record(Call::DeleteApplication { name: name.into(), cascade })?;
        let before = st.apps.len();
        st.apps.retain(|a| a.name != name);
        if st.apps.len() == before {
            return Err(not_found(name));
        }
        Ok(())
    }

    async fn create_application(&self, spec: &AppSpec) -> ApiResult<()> {
        let mut st = self.record(Call::CreateApplication(spec.clone()))?;
        if spec.name.trim().is_empty() {
            return Err(ApiError::Validation("missing application name".into()));
        }
        if st.apps.iter().any(|a| a.name == spec.name) {
            return Err(ApiError::Validation(format!("application already exists: {}", spec.name)));
        }
        st.apps.push(Application {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            project: if spec.project.is_empty() { "default".into() } else { spec.project.clone() },
            health: "Missing".into(),
            sync: "OutOfSync".into(),
            repo_url: spec.repo_url.clone(),
            revision: spec.revision.clone(),
            path: spec.path.clone(),
            cluster: spec.cluster.clone(),
            sync_policy: Some(spec.sync_policy),
            ..Default::default()
        });
        Ok(())
    }

    async fn update_application(&self, spec: &AppSpec) -> ApiResult<()> {
        let mut st = self.record(Call::UpdateApplication(spec.clone()))?;
        let app = find_mut(&mut st.apps, &spec.name)?;
        app.project = spec.project.clone();
        app.repo_url = spec.repo_url.clone();
        app.path = spec.path.clone();
        app.revision = spec.revision.clone();
        app.cluster = spec.cluster.clone();
        app.namespace = spec.namespace.clone();
        app.sync_policy = Some(spec.sync_policy);
        Ok(())
    }

    async fn list_projects(&self) -> ApiResult<Vec<String>> {
        self.record(Call::ListProjects)?;
        Ok(self.projects.clone())
    }

    async fn list_repositories(&self) -> ApiResult<Vec<String>> {
        self.record(Call::ListRepositories)?;
        Ok(self.repositories.clone())
    }

    async fn list_clusters(&self) -> ApiResult<Vec<String>> {
        self.record(Call::ListClusters)?;
        Ok(self.clusters.clone())
    }

    async fn get_resource(&self, app: &str, reference: &ResourceRef) -> ApiResult<String> {
        let st = self.record(Call::GetResource { app: app.into(), reference: reference.clone() })?;
        find(&st.apps, app)?;
        Ok(render_manifest(reference))
    }

    async fn get_manifests(&self, app: &str) -> ApiResult<Vec<String>> {
        let st = self.record(Call::GetManifests(app.into()))?;
        let found = find(&st.apps, app)?;
        Ok(found.resources.iter().map(|r| render_manifest(&r.reference())).collect())
    }

    async fn list_events(&self, app: &str) -> ApiResult<Vec<Event>> {
        let st = self.record(Call::ListEvents(app.into()))?;
        find(&st.apps, app)?;
        let ago = |mins: i64| (Utc::now() - ChronoDuration::minutes(mins)).to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(vec![
            Event {
                kind: "Normal".into(),
                reason: "Synced".into(),
                message: "application synced".into(),
                timestamp: ago(10),
                involved_object: format!("Application/{}", app),
            },
            Event {
                kind: "Warning".into(),
                reason: "Drift".into(),
                message: "resource out of sync detected".into(),
                timestamp: ago(2),
                involved_object: "Deployment/example".into(),
            },
        ])
    }

    async fn pod_logs(&self, app: &str, pod: &str, container: Option<&str>, follow: bool) -> ApiResult<ByteStream> {
        self.record(Call::PodLogs { app: app.into(), pod: pod.into(), container: container.map(Into::into), follow })?;
        self.logs_opened.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<ApiResult<Bytes>> = self.log_lines.iter().map(|l| Ok(Bytes::from(format!("{}\n", l)))).collect();
        let lines = futures::stream::iter(chunks);
        let inner: ByteStream = if self.hold_logs_open && follow {
            Box::pin(futures::StreamExt::chain(lines, futures::stream::pending()))
        } else {
            Box::pin(lines)
        };
        let tracked: ByteStream = Box::pin(TrackedStream { inner, released: self.logs_released.clone() });
        Ok(tracked)
    }

    async fn server_side_diff(&self, app: &str) -> ApiResult<Vec<DiffResult>> {
        let st = self.record(Call::ServerSideDiff(app.into()))?;
        let found = find(&st.apps, app)?;
        Ok(found
            .resources
            .iter()
            .filter(|r| r.is_drifted())
            .map(|r| DiffResult {
                reference: r.reference(),
                diff: "--- live\n+++ desired\n@@\n- replicas: 1\n+ replicas: 2\n".into(),
                modified: true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn records_calls_in_order_and_scripts_failures() {
        let api = MockApi::demo();
        api.fail_on(|c| matches!(c, Call::SyncApplication { name, .. } if name == "web-frontend"), ApiError::Internal("boom".into()));
        assert!(api.sync_application("web-frontend", true).await.is_err());
        assert!(api.sync_application("payments-api", true).await.is_ok());
        assert_eq!(
            api.calls(),
            vec![
                Call::SyncApplication { name: "web-frontend".into(), dry_run: true },
                Call::SyncApplication { name: "payments-api".into(), dry_run: true },
            ]
        );
        assert!(api.calls().iter().all(|c| !c.is_mutating()));
    }

    #[tokio::test]
    async fn real_sync_clears_drift() {
        let api = MockApi::demo();
        api.sync_application("web-frontend", false).await.unwrap();
        let web = api.refresh_application("web-frontend", false).await.unwrap();
        assert_eq!(web.sync, SYNCED);
        assert_eq!(web.drifted_resources().count(), 0);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_delete_removes() {
        let api = MockApi::demo();
        let spec = AppSpec { name: "payments-api".into(), ..Default::default() };
        assert!(matches!(api.create_application(&spec).await, Err(ApiError::Validation(_))));
        api.delete_application("payments-api", true).await.unwrap();
        assert!(api.apps().iter().all(|a| a.name != "payments-api"));
        assert!(matches!(api.delete_application("payments-api", false).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn terminate_clears_operation_state() {
        let api = MockApi::demo();
        api.terminate_operation("orders-worker").await.unwrap();
        let orders = api.refresh_application("orders-worker", false).await.unwrap();
        assert!(orders.operation_state.is_none());
    }

    #[tokio::test]
    async fn log_stream_counts_release_on_drop() {
        let api = MockApi::demo().with_log_lines(["a", "b"]);
        let mut s = api.pod_logs("payments-api", "p", None, false).await.unwrap();
        let mut got = Vec::new();
        while let Some(Ok(b)) = s.next().await {
            got.push(b);
        }
        assert_eq!(got.len(), 2);
        assert_eq!(api.logs_released(), 0);
        drop(s);
        assert_eq!(api.logs_opened(), 1);
        assert_eq!(api.logs_released(), 1);
    }

    #[test]
    fn manifest_renders_api_version() {
        let r = ResourceRef { group: "apps".into(), kind: "Deployment".into(), version: "v1".into(), name: "web".into(), namespace: "web".into() };
        let m = render_manifest(&r);
        assert!(m.starts_with("apiVersion: apps/v1\nkind: Deployment\n"));
        assert!(m.contains("namespace: web"));
    }
}
