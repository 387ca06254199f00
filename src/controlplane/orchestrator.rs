//! Main Orchestrator
//!
//! Sequences volume operations against the storage controller with
//! declaration operations against the cluster store to form one logical
//! create/delete/list operation per request.
//!
//! There is no transactional coordinator spanning both systems. Each phase
//! fails independently, validation happens before anything is mutated, and a
//! failure between the two mutations is surfaced as a partially-applied
//! outcome with enough context logged for manual remediation - never retried
//! or rolled back silently.

use crate::cluster::builder::{self, TargetParams};
use crate::cluster::config::{target_name_from_iqn, ClusterConfiguration, DeclarationKind};
use crate::cluster::probe::{probe, TargetRunStates};
use crate::cluster::tid;
use crate::domain::ports::{
    ClusterStoreRef, HealthVerdict, RunState, StorageControllerRef, VolumeRequest, VolumeState,
};
use crate::error::{Error, Result};
use crate::health;
use futures::future;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// =============================================================================
// Requests
// =============================================================================

/// Inputs for creating one highly-available iSCSI logical unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Full IQN; the target name is everything after the first `:`
    pub iqn: String,
    /// Logical unit number
    pub lun: u8,
    /// Volume size in KiB
    pub size_kib: u64,
    /// Nodes holding a replica of the backing volume
    pub storage_nodes: Vec<String>,
    /// Additional nodes eligible to run the target without local storage
    #[serde(default)]
    pub client_nodes: Vec<String>,
    /// Floating service address clients connect to
    pub service_ip: String,
    /// CHAP username
    #[serde(default)]
    pub username: Option<String>,
    /// CHAP password
    #[serde(default)]
    pub password: Option<String>,
    /// Comma-separated portal list
    #[serde(default)]
    pub portals: Option<String>,
}

// =============================================================================
// Overview
// =============================================================================

/// Health of one logical unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LunHealth {
    pub lun: u8,
    pub run_state: RunState,
    pub volume_state: VolumeState,
    pub verdict: HealthVerdict,
}

/// Health of one target and its logical units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHealth {
    pub name: String,
    pub iqn: Option<String>,
    pub tid: Option<u8>,
    pub target_state: RunState,
    pub service_ip_state: RunState,
    pub luns: Vec<LunHealth>,
    pub probed_at: chrono::DateTime<chrono::Utc>,
}

/// Snapshot of everything this operator manages plus what else lives in the
/// cluster, for listing and monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOverview {
    pub targets: Vec<TargetHealth>,
    pub target_primitives: Vec<String>,
    pub logical_units: Vec<String>,
    pub other_resources: Vec<String>,
    pub allocated_tids: Vec<u8>,
    pub next_free_tid: Option<u8>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates the cluster store and the storage controller.
pub struct Orchestrator {
    cluster: ClusterStoreRef,
    storage: StorageControllerRef,
}

impl Orchestrator {
    pub fn new(cluster: ClusterStoreRef, storage: StorageControllerRef) -> Arc<Self> {
        Arc::new(Self { cluster, storage })
    }

    /// Create a replicated volume and the cluster declarations exposing it
    /// as a highly-available iSCSI logical unit.
    pub async fn create_target(&self, request: CreateRequest) -> Result<()> {
        // Phase a: derive and validate the target name. Nothing external has
        // been touched if this fails.
        let target = target_name_from_iqn(&request.iqn)
            .ok_or_else(|| Error::MalformedIqn {
                iqn: request.iqn.clone(),
            })?
            .to_string();
        if request.size_kib == 0 {
            return Err(Error::InvalidParameter("volume size must be non-zero".into()));
        }

        // Phase b: read the configuration and allocate a target ID from a
        // fresh snapshot. Still nothing mutated on failure.
        let document = self.cluster.fetch().await?;
        let config = ClusterConfiguration::parse(&document)?;
        let tid = tid::allocate(&config.tid_set)?;

        let mut nodes = request.storage_nodes.clone();
        for node in &request.client_nodes {
            if !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        let params = TargetParams {
            iqn: request.iqn.clone(),
            target: target.clone(),
            lun: request.lun,
            nodes,
            service_ip: request.service_ip.clone(),
            username: request.username.clone(),
            password: request.password.clone(),
            portals: request.portals.clone(),
            tid,
        };
        builder::validate(&config, &params)?;

        info!(
            "Creating target {} LUN {} ({} KiB, tid {})",
            target, request.lun, request.size_kib, tid
        );

        // Phase c: create the backing volume. On failure the cluster
        // configuration is untouched, so there is nothing to compensate.
        let device_path = self
            .storage
            .create_volume(VolumeRequest {
                name: target.clone(),
                lun: request.lun,
                size_kib: request.size_kib,
                storage_nodes: request.storage_nodes.clone(),
            })
            .await?;

        // Phase d: build and submit the declaration set. A failure here
        // leaves the volume allocated and orphaned; that is reported, not
        // repaired.
        let set = builder::build(&config, &params, &device_path)?;
        let updated = config.with_declarations(&set)?;
        match self.cluster.replace(&updated, config.version()).await {
            Ok(()) => {
                info!(
                    "Target {} LUN {} created at {} with {} declarations",
                    target,
                    request.lun,
                    device_path,
                    set.len()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Cluster configuration update failed after volume {}/{} was created; \
                     the volume is left allocated and requires manual cleanup: {}",
                    target, request.lun, e
                );
                if e.is_conflict() {
                    // A conflict is retryable by the caller; keep it typed.
                    Err(e)
                } else {
                    Err(Error::PartiallyApplied {
                        phase: "cluster configuration update".into(),
                        committed: format!("volume {}/{}", target, request.lun),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Remove the cluster declarations for one logical unit, then delete its
    /// backing volume.
    ///
    /// The order mirrors creation: declarations go first, so a volume is
    /// never deleted out from under a still-advertised resource. A failed
    /// volume deletion after successful cluster removal is a non-fatal
    /// warning - cluster state is authoritative and the leftover volume can
    /// be cleaned up manually.
    pub async fn delete_target(&self, iqn: &str, lun: u8) -> Result<()> {
        let target = target_name_from_iqn(iqn)
            .ok_or_else(|| Error::MalformedIqn {
                iqn: iqn.to_string(),
            })?
            .to_string();

        let document = self.cluster.fetch().await?;
        let config = ClusterConfiguration::parse(&document)?;
        let names = builder::removal(&config, &target, lun)?;

        info!(
            "Deleting target {} LUN {} ({} declarations)",
            target,
            lun,
            names.len()
        );

        let updated = config.without_declarations(&names);
        self.cluster.replace(&updated, config.version()).await?;

        if let Err(e) = self.storage.delete_volume(&target, lun).await {
            warn!(
                "Cluster declarations for {}/{} removed, but volume deletion failed \
                 and the volume is left behind: {}",
                target, lun, e
            );
        }

        Ok(())
    }

    /// Read the configuration once and reconcile it with the storage
    /// controller's view into one overview.
    pub async fn list_targets(&self) -> Result<ClusterOverview> {
        let document = self.cluster.fetch().await?;
        let config = ClusterConfiguration::parse(&document)?;

        // Volume-state queries are read-only and independent, one per
        // target, so they are issued concurrently.
        let states = future::join_all(config.targets.iter().map(|record| {
            let storage = Arc::clone(&self.storage);
            async move {
                match storage.volume_state(&record.name).await {
                    Ok(state) => state,
                    Err(e) => {
                        warn!("Volume state query for {} failed: {}", record.name, e);
                        VolumeState::Unknown
                    }
                }
            }
        }))
        .await;

        let probed_at = chrono::Utc::now();
        let targets = config
            .targets
            .iter()
            .zip(states)
            .map(|(record, volume_state)| {
                let TargetRunStates {
                    target,
                    service_ip,
                    luns,
                } = probe(&config, &record.name);

                let luns = luns
                    .into_iter()
                    .map(|(lun, run_state)| LunHealth {
                        lun,
                        run_state,
                        volume_state,
                        verdict: health::aggregate(target, service_ip, run_state, volume_state),
                    })
                    .collect();

                TargetHealth {
                    name: record.name.clone(),
                    iqn: record.iqn.clone(),
                    tid: record.tid,
                    target_state: target,
                    service_ip_state: service_ip,
                    luns,
                    probed_at,
                }
            })
            .collect();

        Ok(ClusterOverview {
            targets,
            target_primitives: config.names_of_kind(DeclarationKind::Target),
            logical_units: config.names_of_kind(DeclarationKind::LogicalUnit),
            other_resources: config.names_of_kind(DeclarationKind::Other),
            allocated_tids: config.tid_set.iter().copied().collect(),
            next_free_tid: tid::allocate(&config.tid_set).ok(),
        })
    }
}
