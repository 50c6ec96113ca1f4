//! Argonav core types.
//!
//! Plain data for Argo CD applications and everything hanging off them.
//! No I/O lives here; the api crate fills these in and the session crate
//! reads them.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync status value Argo CD reports for an application with no drift.
pub const SYNCED: &str = "Synced";

/// A declared deployment target tracked for health/sync state.
///
/// Replaced wholesale on every list/detail refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub namespace: String,
    pub project: String,
    pub health: String,
    pub sync: String,
    pub repo_url: String,
    pub revision: String,
    pub path: String,
    pub cluster: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub operation_state: Option<OperationState>,
    #[serde(default)]
    pub sync_policy: Option<SyncPolicy>,
    #[serde(default)]
    pub history: Vec<SyncHistoryEntry>,
}

impl Application {
    /// Drifted means anything other than an exact "Synced".
    pub fn is_drifted(&self) -> bool {
        self.sync != SYNCED
    }

    /// Resources whose status is known and not synced.
    pub fn drifted_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_drifted())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub group: String,
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub health: String,
    #[serde(default)]
    pub hook: bool,
}

impl Resource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            group: self.group.clone(),
            kind: self.kind.clone(),
            version: self.version.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    pub fn is_pod(&self) -> bool {
        self.kind.eq_ignore_ascii_case("pod")
    }

    pub fn is_drifted(&self) -> bool {
        !self.status.is_empty() && self.status != SYNCED
    }
}

/// Identifies one resource instance inside an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub group: String,
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)?;
        if !self.namespace.is_empty() {
            write!(f, " ({})", self.namespace)?;
        }
        Ok(())
    }
}

/// In-flight operation reported by the server (e.g. a running sync).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    pub phase: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    #[default]
    Manual,
    Auto,
}

impl SyncPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPolicy::Manual => "manual",
            SyncPolicy::Auto => "auto",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SyncPolicy::Manual => SyncPolicy::Auto,
            SyncPolicy::Auto => SyncPolicy::Manual,
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One past deployment as recorded in the application status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: i64,
    pub revision: String,
    pub deployed_at: String,
    /// Source block serialized as compact JSON, empty when absent.
    pub source: String,
}

/// A rollback candidate. Loaded lazily when the rollback flow opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub revision: String,
    pub author: String,
    pub date: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Normal / Warning
    pub kind: String,
    pub reason: String,
    pub message: String,
    pub timestamp: String,
    /// Rendered as `Kind/name (ns)`.
    pub involved_object: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub reference: ResourceRef,
    pub diff: String,
    pub modified: bool,
}

/// Payload for creating or updating an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    pub project: String,
    pub repo_url: String,
    pub path: String,
    pub revision: String,
    pub cluster: String,
    pub namespace: String,
    pub sync_policy: SyncPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("missing {0}")]
    Missing(&'static str),
}

impl AppSpec {
    /// Seed an edit from an existing application; the project is carried over unchanged.
    pub fn from_application(app: &Application) -> Self {
        Self {
            name: app.name.clone(),
            project: app.project.clone(),
            repo_url: app.repo_url.clone(),
            path: app.path.clone(),
            revision: app.revision.clone(),
            cluster: app.cluster.clone(),
            namespace: app.namespace.clone(),
            sync_policy: app.sync_policy.unwrap_or_default(),
        }
    }

    /// Every text field must be non-blank.
    pub fn validate(&self) -> Result<(), SpecError> {
        let fields = [
            ("name", &self.name),
            ("project", &self.project),
            ("repository", &self.repo_url),
            ("path", &self.path),
            ("revision", &self.revision),
            ("cluster", &self.cluster),
            ("namespace", &self.namespace),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                return Err(SpecError::Missing(label));
            }
        }
        Ok(())
    }
}

pub mod prelude {
    pub use super::{
        AppSpec, Application, DiffResult, Event, OperationState, Resource, ResourceRef, Revision, SpecError,
        SyncHistoryEntry, SyncPolicy, SYNCED,
    };
}
