//! LINSTOR storage controller adapter
//!
//! Drives the storage controller's REST API to create, delete and inspect
//! the replicated volumes backing iSCSI logical units. Placement and
//! replication are the controller's problem; this adapter only asks for a
//! volume and reports back the device path the controller exposed it under.

use crate::domain::ports::{StorageController, VolumeRequest, VolumeState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the LINSTOR adapter
#[derive(Debug, Clone)]
pub struct LinstorConfig {
    /// Controller REST endpoint
    pub endpoint: String,
    /// Upper bound for one API call
    pub timeout: Duration,
}

impl Default for LinstorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3370".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// API Payloads
// =============================================================================

#[derive(Debug, Serialize)]
struct ResourceDefinitionCreate {
    resource_definition: ResourceDefinitionSpec,
}

#[derive(Debug, Serialize)]
struct ResourceDefinitionSpec {
    name: String,
}

#[derive(Debug, Serialize)]
struct VolumeDefinitionCreate {
    volume_definition: VolumeDefinitionSpec,
}

#[derive(Debug, Serialize)]
struct VolumeDefinitionSpec {
    volume_number: u32,
    size_kib: u64,
}

#[derive(Debug, Serialize)]
struct AutoPlaceRequest {
    select_filter: AutoSelectFilter,
}

#[derive(Debug, Serialize)]
struct AutoSelectFilter {
    place_count: u32,
    node_name_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceView {
    #[serde(default)]
    volumes: Vec<VolumeView>,
}

#[derive(Debug, Deserialize)]
struct VolumeView {
    volume_number: u32,
    #[serde(default)]
    device_path: Option<String>,
    #[serde(default)]
    state: Option<VolumeStateView>,
}

#[derive(Debug, Deserialize)]
struct VolumeStateView {
    #[serde(default)]
    disk_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeDefinitionView {
    #[serde(default)]
    #[allow(dead_code)]
    volume_number: Option<u32>,
}

// =============================================================================
// Adapter
// =============================================================================

/// `StorageController` implementation over the LINSTOR REST API.
pub struct LinstorClient {
    config: LinstorConfig,
    client: reqwest::Client,
}

impl LinstorClient {
    pub fn new(config: LinstorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::StorageRequest)?;
        Ok(Self { config, client })
    }

    fn resource_definition_url(&self, name: &str) -> String {
        format!(
            "{}/v1/resource-definitions/{}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }

    fn resource_definitions_url(&self) -> String {
        format!(
            "{}/v1/resource-definitions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    /// Create the resource definition unless it already exists (a target
    /// gaining a second LUN reuses its definition).
    async fn ensure_resource_definition(&self, name: &str) -> Result<()> {
        let body = ResourceDefinitionCreate {
            resource_definition: ResourceDefinitionSpec {
                name: name.to_string(),
            },
        };
        let response = self
            .client
            .post(self.resource_definitions_url())
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!("Resource definition {} already exists", name);
            return Ok(());
        }
        ensure_success("create resource definition", name, response).await?;
        Ok(())
    }

    async fn create_volume_definition(&self, name: &str, lun: u8, size_kib: u64) -> Result<()> {
        let body = VolumeDefinitionCreate {
            volume_definition: VolumeDefinitionSpec {
                volume_number: lun as u32,
                size_kib,
            },
        };
        let response = self
            .client
            .post(format!(
                "{}/volume-definitions",
                self.resource_definition_url(name)
            ))
            .json(&body)
            .send()
            .await?;
        ensure_success("create volume definition", name, response).await?;
        Ok(())
    }

    async fn autoplace(&self, name: &str, nodes: &[String]) -> Result<()> {
        let body = AutoPlaceRequest {
            select_filter: AutoSelectFilter {
                place_count: nodes.len() as u32,
                node_name_list: nodes.to_vec(),
            },
        };
        let response = self
            .client
            .post(format!("{}/autoplace", self.resource_definition_url(name)))
            .json(&body)
            .send()
            .await?;
        ensure_success("autoplace", name, response).await?;
        Ok(())
    }

    async fn fetch_resources(&self, name: &str) -> Result<Vec<ResourceView>> {
        let response = self
            .client
            .get(format!("{}/resources", self.resource_definition_url(name)))
            .send()
            .await?;
        let response = ensure_success("query resources", name, response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl StorageController for LinstorClient {
    async fn create_volume(&self, request: VolumeRequest) -> Result<String> {
        info!(
            "Creating volume {}/{} ({} KiB) across {:?}",
            request.name, request.lun, request.size_kib, request.storage_nodes
        );

        self.ensure_resource_definition(&request.name).await?;
        self.create_volume_definition(&request.name, request.lun, request.size_kib)
            .await?;
        self.autoplace(&request.name, &request.storage_nodes).await?;

        let resources = self.fetch_resources(&request.name).await?;
        let device_path = resources
            .iter()
            .flat_map(|r| r.volumes.iter())
            .find(|v| v.volume_number == request.lun as u32)
            .and_then(|v| v.device_path.clone())
            .filter(|path| !path.is_empty())
            .ok_or_else(|| Error::StorageOperationFailed {
                operation: "create volume".into(),
                resource: request.name.clone(),
                reason: format!("no device path reported for volume {}", request.lun),
            })?;

        info!(
            "Volume {}/{} available at {}",
            request.name, request.lun, device_path
        );
        Ok(device_path)
    }

    async fn delete_volume(&self, name: &str, lun: u8) -> Result<()> {
        info!("Deleting volume {}/{}", name, lun);

        let response = self
            .client
            .delete(format!(
                "{}/volume-definitions/{}",
                self.resource_definition_url(name),
                lun
            ))
            .send()
            .await?;
        ensure_success("delete volume definition", name, response).await?;

        // Drop the resource definition once its last volume is gone.
        let response = self
            .client
            .get(format!(
                "{}/volume-definitions",
                self.resource_definition_url(name)
            ))
            .send()
            .await?;
        let response = ensure_success("query volume definitions", name, response).await?;
        let remaining: Vec<VolumeDefinitionView> = response.json().await?;
        if remaining.is_empty() {
            debug!("Deleting emptied resource definition {}", name);
            let response = self
                .client
                .delete(self.resource_definition_url(name))
                .send()
                .await?;
            ensure_success("delete resource definition", name, response).await?;
        }

        Ok(())
    }

    async fn volume_state(&self, name: &str) -> Result<VolumeState> {
        let response = self
            .client
            .get(format!("{}/resources", self.resource_definition_url(name)))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(VolumeState::Unknown);
        }
        let response = ensure_success("query volume state", name, response).await?;
        let resources: Vec<ResourceView> = response.json().await?;

        let mut states = resources
            .iter()
            .flat_map(|r| r.volumes.iter())
            .map(|v| {
                v.state
                    .as_ref()
                    .and_then(|s| s.disk_state.as_deref())
                    .map(map_disk_state)
                    .unwrap_or(VolumeState::Unknown)
            })
            .peekable();

        if states.peek().is_none() {
            return Ok(VolumeState::Unknown);
        }
        Ok(states.fold(VolumeState::Ok, merge_states))
    }
}

// =============================================================================
// State Mapping
// =============================================================================

/// Map one replica's reported disk state to a volume state. Anything the
/// controller reports that is not recognized here is `Unknown`.
fn map_disk_state(disk_state: &str) -> VolumeState {
    match disk_state {
        "UpToDate" => VolumeState::Ok,
        "Consistent" | "Inconsistent" | "Outdated" | "SyncSource" | "SyncTarget"
        | "Attaching" | "Negotiating" | "Diskless" => VolumeState::Degraded,
        "Failed" => VolumeState::Bad,
        _ => VolumeState::Unknown,
    }
}

/// Merge per-replica states into one resource-wide state, worst report wins.
/// A definitely failed replica outranks one that cannot be seen.
fn merge_states(a: VolumeState, b: VolumeState) -> VolumeState {
    fn rank(state: VolumeState) -> u8 {
        match state {
            VolumeState::Ok => 0,
            VolumeState::Degraded => 1,
            VolumeState::Unknown => 2,
            VolumeState::Bad => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

async fn ensure_success(
    operation: &str,
    resource: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::StorageOperationFailed {
        operation: operation.to_string(),
        resource: resource.to_string(),
        reason: format!("{}: {}", status, body.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_state_mapping() {
        assert_eq!(map_disk_state("UpToDate"), VolumeState::Ok);
        assert_eq!(map_disk_state("Inconsistent"), VolumeState::Degraded);
        assert_eq!(map_disk_state("SyncTarget"), VolumeState::Degraded);
        assert_eq!(map_disk_state("Failed"), VolumeState::Bad);
        assert_eq!(map_disk_state("DUnknown"), VolumeState::Unknown);
        assert_eq!(map_disk_state("SomethingNew"), VolumeState::Unknown);
    }

    #[test]
    fn test_worst_replica_state_wins() {
        assert_eq!(
            merge_states(VolumeState::Ok, VolumeState::Degraded),
            VolumeState::Degraded
        );
        assert_eq!(
            merge_states(VolumeState::Degraded, VolumeState::Ok),
            VolumeState::Degraded
        );
        assert_eq!(
            merge_states(VolumeState::Unknown, VolumeState::Bad),
            VolumeState::Bad
        );
        assert_eq!(
            merge_states(VolumeState::Degraded, VolumeState::Unknown),
            VolumeState::Unknown
        );
    }

    #[test]
    fn test_url_building_encodes_names() {
        let client = LinstorClient::new(LinstorConfig {
            endpoint: "http://controller:3370/".into(),
            ..LinstorConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.resource_definition_url("disk0"),
            "http://controller:3370/v1/resource-definitions/disk0"
        );
        assert_eq!(
            client.resource_definition_url("disk 0"),
            "http://controller:3370/v1/resource-definitions/disk%200"
        );
    }

    #[test]
    fn test_request_payload_shapes() {
        let body = VolumeDefinitionCreate {
            volume_definition: VolumeDefinitionSpec {
                volume_number: 0,
                size_kib: 1_048_576,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["volume_definition"]["volume_number"], 0);
        assert_eq!(value["volume_definition"]["size_kib"], 1_048_576);

        let body = AutoPlaceRequest {
            select_filter: AutoSelectFilter {
                place_count: 2,
                node_name_list: vec!["node-a".into(), "node-b".into()],
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["select_filter"]["place_count"], 2);
        assert_eq!(value["select_filter"]["node_name_list"][1], "node-b");
    }

    #[test]
    fn test_resource_view_parsing() {
        let payload = r#"[
            {"name": "disk0", "node_name": "node-a",
             "volumes": [{"volume_number": 0, "device_path": "/dev/drbd1000",
                          "state": {"disk_state": "UpToDate"}}]},
            {"name": "disk0", "node_name": "node-b",
             "volumes": [{"volume_number": 0, "device_path": "/dev/drbd1000",
                          "state": {"disk_state": "SyncTarget"}}]}
        ]"#;
        let resources: Vec<ResourceView> = serde_json::from_str(payload).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(
            resources[0].volumes[0].device_path.as_deref(),
            Some("/dev/drbd1000")
        );
        assert_eq!(
            resources[1].volumes[0]
                .state
                .as_ref()
                .unwrap()
                .disk_state
                .as_deref(),
            Some("SyncTarget")
        );
    }
}
