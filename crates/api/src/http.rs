//! Network-backed client for the Argo CD REST API (`<server>/api/v1`).

use std::time::{Duration, Instant};

use argonav_core::{AppSpec, Application, DiffResult, Event, ResourceRef, Revision};
use bytes::Bytes;
use futures::StreamExt;
use metrics::{counter, histogram};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::wire;
use crate::{ApiError, ApiResult, ArgoApi, ByteStream};

const MAX_REVISIONS: usize = 20;
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for [`HttpApi`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub server: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server: "https://localhost:8080".into(),
            token: None,
            username: None,
            password: None,
            insecure: false,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpApi {
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
    auth_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    login_token: Mutex<Option<String>>,
}

impl HttpApi {
    pub fn new(cfg: HttpConfig) -> ApiResult<Self> {
        let base = Url::parse(cfg.server.trim_end_matches('/'))
            .map_err(|e| ApiError::Validation(format!("invalid server url {}: {}", cfg.server, e)))?;
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.timeout)
            .danger_accept_invalid_certs(cfg.insecure)
            .user_agent(concat!("argonav/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        info!(server = %base, insecure = cfg.insecure, "argocd http client ready");
        Ok(Self {
            base,
            client,
            timeout: cfg.timeout,
            auth_token: cfg.token.filter(|t| !t.is_empty()),
            username: cfg.username.filter(|u| !u.is_empty()),
            password: cfg.password.filter(|p| !p.is_empty()),
            login_token: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Validation(format!("server url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Static token wins; otherwise log in once with username/password and cache the session token.
    async fn token(&self) -> ApiResult<String> {
        if let Some(t) = &self.auth_token {
            return Ok(t.clone());
        }
        let mut cached = self.login_token.lock().await;
        if let Some(t) = cached.as_ref() {
            return Ok(t.clone());
        }
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(ApiError::Auth("missing Argo CD auth: set ARGOCD_AUTH_TOKEN or provide username/password".into()));
        };
        let url = self.url(&["session"], &[])?;
        let body = serde_json::json!({ "username": username, "password": password });
        let raw = self.send(Method::POST, url, Some(body), None).await?;
        let out: wire::SessionToken = decode(&raw)?;
        if out.token.is_empty() {
            return Err(ApiError::Auth("argocd login returned empty token".into()));
        }
        info!(user = %username, "argocd login ok");
        *cached = Some(out.token.clone());
        Ok(out.token)
    }

    async fn send(&self, method: Method, url: Url, body: Option<serde_json::Value>, token: Option<&str>) -> ApiResult<Bytes> {
        let path = url.path().to_string();
        let mut req = self.client.request(method.clone(), url).timeout(self.timeout).header("Accept", "application/json");
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let t0 = Instant::now();
        let res = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let err = transport_error(&e);
                error!(method = %method, path = %path, took_ms = %t0.elapsed().as_millis(), error = %err, "argocd request failed");
                return Err(err);
            }
        };
        let status = res.status();
        let raw = res.bytes().await.map_err(|e| transport_error(&e))?;
        log_response(&method, &path, status, t0.elapsed());
        if !status.is_success() {
            return Err(status_error(&method, path, status, &raw));
        }
        Ok(raw)
    }

    async fn call(&self, method: Method, url: Url, body: Option<serde_json::Value>) -> ApiResult<Bytes> {
        let token = self.token().await?;
        self.send(method, url, body, Some(&token)).await
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, segments: &[&str], query: &[(&str, &str)]) -> ApiResult<T> {
        let url = self.url(segments, query)?;
        let raw = self.call(Method::GET, url, None).await?;
        decode(&raw)
    }
}

fn decode<T: DeserializeOwned + Default>(raw: &[u8]) -> ApiResult<T> {
    if raw.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(raw).map_err(|e| ApiError::Decode(e.to_string()))
}

fn log_response(method: &Method, path: &str, status: StatusCode, took: Duration) {
    histogram!("argonav_http_ms", took.as_secs_f64() * 1000.0);
    debug!(method = %method, path = %path, status = status.as_u16(), took_ms = %took.as_millis(), "argocd request");
}

/// Non-2xx response as an error, body truncated.
fn status_error(method: &Method, path: String, status: StatusCode, raw: &[u8]) -> ApiError {
    counter!("argonav_http_errors_total", 1);
    let body = truncate(String::from_utf8_lossy(raw).trim());
    warn!(method = %method, path = %path, status = status.as_u16(), response = %body, "argocd non-2xx response");
    ApiError::Status { method: method.to_string(), path, status: status.as_u16(), body }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Flatten the error chain; certificate problems get the TLS hint.
fn transport_error(e: &reqwest::Error) -> ApiError {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        message.push_str(": ");
        message.push_str(&s.to_string());
        source = s.source();
    }
    let lower = message.to_ascii_lowercase();
    let tls = lower.contains("x509") || lower.contains("certificate");
    ApiError::Transport { message, tls }
}

#[async_trait::async_trait]
impl ArgoApi for HttpApi {
    async fn list_applications(&self) -> ApiResult<Vec<Application>> {
        let t0 = Instant::now();
        let list: wire::AppList = self.get_json(&["applications"], &[]).await?;
        let apps: Vec<Application> = list.items.unwrap_or_default().into_iter().map(wire::AppItem::into_application).collect();
        info!(count = apps.len(), took_ms = %t0.elapsed().as_millis(), "api: list_applications ok");
        Ok(apps)
    }

    async fn refresh_application(&self, name: &str, hard: bool) -> ApiResult<Application> {
        let query: &[(&str, &str)] = if hard { &[("refresh", "hard")] } else { &[] };
        let item: wire::AppItem = self.get_json(&["applications", name], query).await?;
        let mut app = item.into_application();
        // The resource tree is richer than status.resources; best effort.
        match self.get_json::<wire::ResourceTree>(&["applications", name, "resource-tree"], &[]).await {
            Ok(tree) => {
                let nodes = tree.nodes.unwrap_or_default();
                if !nodes.is_empty() {
                    app.resources = nodes.into_iter().map(wire::ResourceItem::into_resource).collect();
                }
            }
            Err(e) => debug!(app = %name, error = %e, "resource-tree unavailable"),
        }
        Ok(app)
    }

    async fn sync_application(&self, name: &str, dry_run: bool) -> ApiResult<()> {
        let url = self.url(&["applications", name, "sync"], &[])?;
        self.call(Method::POST, url, Some(serde_json::json!({ "dryRun": dry_run }))).await?;
        info!(app = %name, dry_run, "api: sync ok");
        Ok(())
    }

    async fn list_revisions(&self, name: &str) -> ApiResult<Vec<Revision>> {
        let item: wire::AppItem = self.get_json(&["applications", name], &[]).await?;
        let mut revs = Vec::new();
        for h in item.status.history.unwrap_or_default() {
            let mut rev = Revision { id: h.id, revision: h.revision.clone(), ..Default::default() };
            if !h.revision.is_empty() {
                if let Ok(meta) = self
                    .get_json::<wire::RevisionMetadata>(&["applications", name, "revisions", &h.revision, "metadata"], &[])
                    .await
                {
                    rev.author = meta.author;
                    rev.date = meta.date;
                    rev.message = meta.message;
                }
            }
            revs.push(rev);
        }
        revs.sort_by(|a, b| b.id.cmp(&a.id));
        revs.truncate(MAX_REVISIONS);
        Ok(revs)
    }

    async fn rollback_application(&self, name: &str, revision_id: i64) -> ApiResult<()> {
        let url = self.url(&["applications", name, "rollback"], &[])?;
        self.call(Method::POST, url, Some(serde_json::json!({ "id": revision_id }))).await?;
        info!(app = %name, revision_id, "api: rollback ok");
        Ok(())
    }

    async fn terminate_operation(&self, name: &str) -> ApiResult<()> {
        let url = self.url(&["applications", name, "operation"], &[])?;
        self.call(Method::DELETE, url, None).await?;
        info!(app = %name, "api: terminate ok");
        Ok(())
    }

    async fn delete_application(&self, name: &str, cascade: bool) -> ApiResult<()> {
        let query: &[(&str, &str)] = if cascade { &[("cascade", "true")] } else { &[] };
        let url = self.url(&["applications", name], query)?;
        self.call(Method::DELETE, url, None).await?;
        info!(app = %name, cascade, "api: delete ok");
        Ok(())
    }

    async fn create_application(&self, spec: &AppSpec) -> ApiResult<()> {
        let body = serde_json::to_value(wire::AppManifest::from(spec)).map_err(|e| ApiError::Internal(e.to_string()))?;
        let url = self.url(&["applications"], &[])?;
        self.call(Method::POST, url, Some(body)).await?;
        info!(app = %spec.name, "api: create ok");
        Ok(())
    }

    async fn update_application(&self, spec: &AppSpec) -> ApiResult<()> {
        if spec.name.trim().is_empty() {
            return Err(ApiError::Validation("missing application name".into()));
        }
        let body = serde_json::to_value(wire::AppManifest::from(spec)).map_err(|e| ApiError::Internal(e.to_string()))?;
        let url = self.url(&["applications", &spec.name], &[])?;
        self.call(Method::PUT, url, Some(body)).await?;
        info!(app = %spec.name, "api: update ok");
        Ok(())
    }

    async fn list_projects(&self) -> ApiResult<Vec<String>> {
        let list: wire::ProjectList = self.get_json(&["projects"], &[]).await?;
        let mut out: Vec<String> =
            list.items.unwrap_or_default().into_iter().map(|p| p.metadata.name).filter(|n| !n.is_empty()).collect();
        out.sort();
        Ok(out)
    }

    async fn list_repositories(&self) -> ApiResult<Vec<String>> {
        let list: Vec<wire::Repository> = self.get_json(&["repositories"], &[]).await?;
        let mut out: Vec<String> = list.into_iter().map(|r| r.repo).filter(|r| !r.is_empty()).collect();
        out.sort();
        Ok(out)
    }

    async fn list_clusters(&self) -> ApiResult<Vec<String>> {
        let list: Vec<wire::Cluster> = self.get_json(&["clusters"], &[]).await?;
        let mut out: Vec<String> = list
            .into_iter()
            .filter_map(|c| if !c.server.is_empty() { Some(c.server) } else if !c.name.is_empty() { Some(c.name) } else { None })
            .collect();
        out.sort();
        Ok(out)
    }

    async fn get_resource(&self, app: &str, reference: &ResourceRef) -> ApiResult<String> {
        let query = [
            ("namespace", reference.namespace.as_str()),
            ("resourceName", reference.name.as_str()),
            ("version", reference.version.as_str()),
            ("kind", reference.kind.as_str()),
            ("group", reference.group.as_str()),
        ];
        let resp: wire::ManifestResponse = self.get_json(&["applications", app, "resource"], &query).await?;
        Ok(resp.manifest)
    }

    async fn get_manifests(&self, app: &str) -> ApiResult<Vec<String>> {
        let resp: wire::ManifestsResponse = self.get_json(&["applications", app, "manifests"], &[]).await?;
        Ok(resp.manifests.unwrap_or_default())
    }

    async fn list_events(&self, app: &str) -> ApiResult<Vec<Event>> {
        let resp: wire::EventList = self.get_json(&["applications", app, "events"], &[]).await?;
        Ok(resp.items.unwrap_or_default().into_iter().map(wire::EventItem::into_event).collect())
    }

    async fn pod_logs(&self, app: &str, pod: &str, container: Option<&str>, follow: bool) -> ApiResult<ByteStream> {
        let mut query = Vec::new();
        if let Some(c) = container.filter(|c| !c.is_empty()) {
            query.push(("container", c));
        }
        if follow {
            query.push(("follow", "true"));
        }
        let url = self.url(&["applications", app, "pods", pod, "logs"], &query)?;
        let token = self.token().await?;
        let path = url.path().to_string();
        let t0 = Instant::now();
        // No request timeout: a followed stream stays open until cancelled.
        let res = match self.client.get(url).bearer_auth(token).send().await {
            Ok(r) => r,
            Err(e) => {
                let err = transport_error(&e);
                error!(method = "GET", path = %path, took_ms = %t0.elapsed().as_millis(), error = %err, "argocd request failed");
                return Err(err);
            }
        };
        let status = res.status();
        log_response(&Method::GET, &path, status, t0.elapsed());
        if !status.is_success() {
            let raw = res.bytes().await.unwrap_or_default();
            return Err(status_error(&Method::GET, path, status, &raw));
        }
        info!(app = %app, pod = %pod, follow, "api: pod logs stream opened");
        let stream: ByteStream = Box::pin(res.bytes_stream().map(|r| r.map_err(|e| transport_error(&e))));
        Ok(stream)
    }

    async fn server_side_diff(&self, app: &str) -> ApiResult<Vec<DiffResult>> {
        let resp: wire::DiffResponse = self.get_json(&["applications", app, "server-side-diff"], &[]).await?;
        Ok(resp.into_results())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(server: &str) -> HttpApi {
        HttpApi::new(HttpConfig { server: server.into(), token: Some("t".into()), ..Default::default() }).unwrap()
    }

    #[test]
    fn url_escapes_segments_and_keeps_base_path() {
        let a = api("https://argo.example.com/argo/");
        let url = a.url(&["applications", "my app", "sync"], &[]).unwrap();
        assert_eq!(url.as_str(), "https://argo.example.com/argo/api/v1/applications/my%20app/sync");
        let url = a.url(&["applications", "web"], &[("cascade", "true")]).unwrap();
        assert_eq!(url.as_str(), "https://argo.example.com/argo/api/v1/applications/web?cascade=true");
    }

    #[test]
    fn invalid_server_is_validation_error() {
        let err = HttpApi::new(HttpConfig { server: "not a url".into(), ..Default::default() }).err();
        assert!(matches!(err, Some(ApiError::Validation(_))));
    }

    #[test]
    fn truncate_caps_long_bodies() {
        let long = "x".repeat(MAX_ERROR_BODY + 10);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_BODY + 1);
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn non_success_becomes_status_error_with_short_body() {
        let body = format!("  {}  ", "e".repeat(MAX_ERROR_BODY * 2));
        let err = status_error(&Method::GET, "/api/v1/applications/web/pods/web-0/logs".into(), StatusCode::FORBIDDEN, body.as_bytes());
        let ApiError::Status { method, path, status, body } = err else {
            panic!("expected status error");
        };
        assert_eq!(method, "GET");
        assert_eq!(path, "/api/v1/applications/web/pods/web-0/logs");
        assert_eq!(status, 403);
        assert_eq!(body.chars().count(), MAX_ERROR_BODY + 1);
    }

    #[test]
    fn empty_body_decodes_to_default() {
        let out: wire::ManifestsResponse = decode(b"").unwrap();
        assert!(out.manifests.is_none());
        assert!(matches!(decode::<wire::ManifestsResponse>(b"{"), Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn missing_credentials_is_auth_error() {
        let a = HttpApi::new(HttpConfig::default()).unwrap();
        assert!(matches!(a.token().await, Err(ApiError::Auth(_))));
    }
}
