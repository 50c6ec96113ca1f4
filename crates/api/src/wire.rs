//! Argo CD REST payloads. Only the fields we read are modelled; everything
//! defaults so that partial or null responses still decode.

use argonav_core::{Application, DiffResult, Event, OperationState, Resource, ResourceRef, SyncHistoryEntry, SyncPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppList {
    pub items: Option<Vec<AppItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppItem {
    pub metadata: Metadata,
    pub spec: AppItemSpec,
    pub status: AppStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Metadata {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct AppItemSpec {
    pub project: String,
    pub destination: Destination,
    pub source: Source,
    pub sync_policy: Option<WireSyncPolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct Destination {
    pub server: String,
    pub namespace: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Source {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub path: String,
    pub target_revision: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct WireSyncPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct AppStatus {
    pub health: StatusField,
    pub sync: StatusField,
    pub operation_state: Option<WireOperationState>,
    pub history: Option<Vec<HistoryItem>>,
    pub resources: Option<Vec<ResourceItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StatusField {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireOperationState {
    pub phase: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct HistoryItem {
    pub id: i64,
    pub revision: String,
    pub deployed_at: String,
    pub deploy_started_at: String,
    pub source: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ResourceItem {
    pub group: String,
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub sync_status: String,
    pub health: Option<StatusField>,
    pub hook: bool,
}

impl ResourceItem {
    pub fn into_resource(self) -> Resource {
        let status = if self.status.is_empty() { self.sync_status } else { self.status };
        Resource {
            group: self.group,
            kind: self.kind,
            version: self.version,
            name: self.name,
            namespace: self.namespace,
            status,
            health: self.health.map(|h| h.status).unwrap_or_default(),
            hook: self.hook,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ResourceTree {
    pub nodes: Option<Vec<ResourceItem>>,
}

impl AppItem {
    pub fn into_application(self) -> Application {
        let policy = self.spec.sync_policy.map(|p| if p.automated.is_some() { SyncPolicy::Auto } else { SyncPolicy::Manual });
        let history = self
            .status
            .history
            .unwrap_or_default()
            .into_iter()
            .map(|h| SyncHistoryEntry {
                id: h.id,
                revision: h.revision,
                deployed_at: if h.deployed_at.is_empty() { h.deploy_started_at } else { h.deployed_at },
                source: h.source.map(|s| s.to_string()).unwrap_or_default(),
            })
            .collect();
        Application {
            name: self.metadata.name,
            namespace: self.spec.destination.namespace,
            project: self.spec.project,
            health: self.status.health.status,
            sync: self.status.sync.status,
            repo_url: self.spec.source.repo_url,
            revision: self.spec.source.target_revision,
            path: self.spec.source.path,
            cluster: self.spec.destination.server,
            resources: self.status.resources.unwrap_or_default().into_iter().map(ResourceItem::into_resource).collect(),
            operation_state: self.status.operation_state.map(|o| OperationState { phase: o.phase, message: o.message }),
            sync_policy: policy,
            history,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SessionToken {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RevisionMetadata {
    pub author: String,
    pub date: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectList {
    pub items: Option<Vec<ProjectItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ProjectItem {
    pub metadata: Metadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Repository {
    pub repo: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Cluster {
    pub server: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ManifestResponse {
    pub manifest: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ManifestsResponse {
    pub manifests: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EventList {
    pub items: Option<Vec<EventItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EventItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub message: String,
    pub last_timestamp: Option<String>,
    pub event_time: Option<String>,
    pub creation_timestamp: Option<String>,
    pub first_timestamp: Option<String>,
    pub involved_object: InvolvedObject,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InvolvedObject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl EventItem {
    pub fn into_event(self) -> Event {
        let timestamp = [self.last_timestamp, self.event_time, self.creation_timestamp, self.first_timestamp]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        let mut object = self.involved_object.kind.trim().to_string();
        if !self.involved_object.name.is_empty() {
            object.push('/');
            object.push_str(&self.involved_object.name);
        }
        if !self.involved_object.namespace.is_empty() {
            object.push_str(&format!(" ({})", self.involved_object.namespace));
        }
        Event { kind: self.kind, reason: self.reason, message: self.message, timestamp, involved_object: object }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DiffResponse {
    pub items: Option<Vec<DiffItem>>,
    pub diffs: Option<Vec<DiffItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DiffItem {
    pub diff: String,
    pub modified: bool,
    pub resource: ResourceRefItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ResourceRefItem {
    pub group: String,
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
}

impl DiffResponse {
    pub fn into_results(self) -> Vec<DiffResult> {
        let items = match self.items {
            Some(items) if !items.is_empty() => items,
            _ => self.diffs.unwrap_or_default(),
        };
        items
            .into_iter()
            .map(|d| DiffResult {
                reference: ResourceRef {
                    group: d.resource.group,
                    kind: d.resource.kind,
                    version: d.resource.version,
                    name: d.resource.name,
                    namespace: d.resource.namespace,
                },
                diff: d.diff,
                modified: d.modified,
            })
            .collect()
    }
}

/// Body for create (POST) and update (PUT).
#[derive(Debug, Serialize)]
pub(crate) struct AppManifest {
    pub metadata: ManifestMetadata,
    pub spec: ManifestSpec,
}

#[derive(Debug, Serialize)]
pub(crate) struct ManifestMetadata {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ManifestSpec {
    pub project: String,
    pub source: Source,
    pub destination: Destination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<WireSyncPolicy>,
}

impl From<&argonav_core::AppSpec> for AppManifest {
    fn from(spec: &argonav_core::AppSpec) -> Self {
        let sync_policy = match spec.sync_policy {
            SyncPolicy::Auto => Some(WireSyncPolicy { automated: Some(serde_json::json!({})) }),
            SyncPolicy::Manual => None,
        };
        AppManifest {
            metadata: ManifestMetadata { name: spec.name.clone() },
            spec: ManifestSpec {
                project: spec.project.clone(),
                source: Source { repo_url: spec.repo_url.clone(), path: spec.path.clone(), target_revision: spec.revision.clone() },
                destination: Destination { server: spec.cluster.clone(), namespace: spec.namespace.clone() },
                sync_policy,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argonav_core::AppSpec;

    #[test]
    fn application_decodes_with_tree_fallback_fields() {
        let raw = serde_json::json!({
            "metadata": {"name": "web"},
            "spec": {
                "project": "default",
                "destination": {"server": "https://k", "namespace": "web"},
                "source": {"repoURL": "https://git/x", "path": "apps/web", "targetRevision": "main"},
                "syncPolicy": {"automated": {"prune": true}}
            },
            "status": {
                "health": {"status": "Healthy"},
                "sync": {"status": "OutOfSync"},
                "operationState": {"phase": "Running", "message": "syncing"},
                "history": [{"id": 3, "revision": "abc", "deployStartedAt": "2026-01-01T00:00:00Z"}],
                "resources": [{"kind": "Deployment", "name": "web", "syncStatus": "OutOfSync", "health": {"status": "Healthy"}}]
            }
        });
        let item: AppItem = serde_json::from_value(raw).unwrap();
        let app = item.into_application();
        assert_eq!(app.repo_url, "https://git/x");
        assert_eq!(app.sync_policy, Some(SyncPolicy::Auto));
        assert_eq!(app.operation_state.as_ref().map(|o| o.phase.as_str()), Some("Running"));
        assert_eq!(app.history[0].deployed_at, "2026-01-01T00:00:00Z");
        assert_eq!(app.resources[0].status, "OutOfSync");
        assert_eq!(app.resources[0].health, "Healthy");
    }

    #[test]
    fn null_items_decode_to_empty() {
        let list: AppList = serde_json::from_str(r#"{"metadata":{},"items":null}"#).unwrap();
        assert!(list.items.is_none());
    }

    #[test]
    fn event_timestamp_fallback_and_object_label() {
        let raw = serde_json::json!({
            "type": "Warning",
            "reason": "BackOff",
            "message": "restarting",
            "lastTimestamp": " ",
            "eventTime": "2026-02-01T00:00:00Z",
            "involvedObject": {"kind": "Pod", "name": "web-1", "namespace": "web"}
        });
        let ev: EventItem = serde_json::from_value(raw).unwrap();
        let ev = ev.into_event();
        assert_eq!(ev.timestamp, "2026-02-01T00:00:00Z");
        assert_eq!(ev.involved_object, "Pod/web-1 (web)");
    }

    #[test]
    fn diff_prefers_items_then_diffs() {
        let raw = serde_json::json!({"diffs": [{"diff": "-a\n+b", "modified": true, "resource": {"kind": "Service", "name": "s"}}]});
        let resp: DiffResponse = serde_json::from_value(raw).unwrap();
        let out = resp.into_results();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reference.kind, "Service");
        assert!(out[0].modified);
    }

    #[test]
    fn manifest_sets_automated_only_for_auto_policy() {
        let mut spec = AppSpec { name: "a".into(), sync_policy: SyncPolicy::Auto, ..Default::default() };
        let body = serde_json::to_value(AppManifest::from(&spec)).unwrap();
        assert_eq!(body["spec"]["syncPolicy"]["automated"], serde_json::json!({}));
        assert_eq!(body["spec"]["source"]["repoURL"], serde_json::json!(""));
        spec.sync_policy = SyncPolicy::Manual;
        let body = serde_json::to_value(AppManifest::from(&spec)).unwrap();
        assert!(body["spec"].get("syncPolicy").is_none());
    }
}
