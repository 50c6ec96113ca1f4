//! Argonav backend client.
//!
//! Frontends depend on the [`ArgoApi`] trait only. Two implementations ship
//! here: [`HttpApi`] talks to a real Argo CD server, [`MockApi`] is an
//! in-memory, scripted stand-in used by `--mock` and by tests.

#![forbid(unsafe_code)]

use std::pin::Pin;

use argonav_core::{AppSpec, Application, DiffResult, Event, ResourceRef, Revision};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

mod http;
mod mock;
mod wire;

pub use http::{HttpApi, HttpConfig};
pub use mock::{Call, MockApi};

/// Hint shown for certificate failures against a local port-forward.
pub const TLS_HINT: &str = "TLS error: try --insecure or set ARGOCD_INSECURE=true";

/// Errors surfaced by any backend operation. `Clone` so results can ride inside loop messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ApiError {
    #[error("argocd request failed: {message}")]
    Transport { message: String, tls: bool },
    #[error("auth: {0}")]
    Auth(String),
    #[error("argocd api {method} {path} failed: {status}: {body}")]
    Status { method: String, path: String, status: u16, body: String },
    #[error("decode response: {0}")]
    Decode(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// Remediation hint for the operator, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ApiError::Transport { tls: true, .. } => Some(TLS_HINT),
            ApiError::Transport { .. } => Some("check that the Argo CD server is reachable"),
            ApiError::Auth(_) | ApiError::Status { status: 401 | 403, .. } => {
                Some("set ARGOCD_AUTH_TOKEN or pass --username/--password")
            }
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Raw pod log bytes. Dropping the stream releases the underlying connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = ApiResult<Bytes>> + Send>>;

/// Backend capability the session engine depends on. Every call may fail.
#[async_trait::async_trait]
pub trait ArgoApi: Send + Sync {
    async fn list_applications(&self) -> ApiResult<Vec<Application>>;

    /// Fetch one application with resources and history; `hard` asks the server to re-read git.
    async fn refresh_application(&self, name: &str, hard: bool) -> ApiResult<Application>;

    async fn sync_application(&self, name: &str, dry_run: bool) -> ApiResult<()>;

    /// Newest first.
    async fn list_revisions(&self, name: &str) -> ApiResult<Vec<Revision>>;

    async fn rollback_application(&self, name: &str, revision_id: i64) -> ApiResult<()>;

    async fn terminate_operation(&self, name: &str) -> ApiResult<()>;

    async fn delete_application(&self, name: &str, cascade: bool) -> ApiResult<()>;

    async fn create_application(&self, spec: &AppSpec) -> ApiResult<()>;

    async fn update_application(&self, spec: &AppSpec) -> ApiResult<()>;

    async fn list_projects(&self) -> ApiResult<Vec<String>>;

    async fn list_repositories(&self) -> ApiResult<Vec<String>>;

    async fn list_clusters(&self) -> ApiResult<Vec<String>>;

    /// Live manifest of a single resource.
    async fn get_resource(&self, app: &str, reference: &ResourceRef) -> ApiResult<String>;

    /// Desired-state manifests rendered from git.
    async fn get_manifests(&self, app: &str) -> ApiResult<Vec<String>>;

    async fn list_events(&self, app: &str) -> ApiResult<Vec<Event>>;

    async fn pod_logs(&self, app: &str, pod: &str, container: Option<&str>, follow: bool) -> ApiResult<ByteStream>;

    async fn server_side_diff(&self, app: &str) -> ApiResult<Vec<DiffResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_cover_tls_auth_and_transport() {
        let tls = ApiError::Transport { message: "x509: unknown authority".into(), tls: true };
        assert_eq!(tls.hint(), Some(TLS_HINT));
        let down = ApiError::Transport { message: "connection refused".into(), tls: false };
        assert!(down.hint().is_some_and(|h| h.contains("reachable")));
        let unauth = ApiError::Status { method: "GET".into(), path: "/api/v1/applications".into(), status: 401, body: String::new() };
        assert!(unauth.hint().is_some_and(|h| h.contains("ARGOCD_AUTH_TOKEN")));
        assert_eq!(ApiError::Validation("x".into()).hint(), None);
    }

    #[test]
    fn status_error_renders_method_path_and_body() {
        let e = ApiError::Status { method: "POST".into(), path: "/api/v1/applications/a/sync".into(), status: 500, body: "boom".into() };
        assert_eq!(e.to_string(), "argocd api POST /api/v1/applications/a/sync failed: 500: boom");
    }
}
