//! Domain Ports - Core trait definitions for the operator
//!
//! These traits define the boundaries between the orchestration core and the
//! two external systems it coordinates: the cluster resource manager's
//! configuration store and the replicated storage controller. Adapters
//! implement these traits to provide concrete functionality.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Run State
// =============================================================================

/// Live run state of one cluster-managed resource, as reported by the status
/// section of the cluster configuration document.
///
/// A resource absent from the status section (never scheduled, or its node
/// unreachable) is `Unknown`, not `Stopped` - these are distinguishable
/// failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
    Unknown,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Stopped => write!(f, "stopped"),
            RunState::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Volume State
// =============================================================================

/// Health of a backing volume as reported by the storage controller,
/// independent of cluster run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Ok,
    Degraded,
    Bad,
    Unknown,
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeState::Ok => write!(f, "ok"),
            VolumeState::Degraded => write!(f, "degraded"),
            VolumeState::Bad => write!(f, "bad"),
            VolumeState::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Health Verdict
// =============================================================================

/// Aggregated health of one logical unit, combining its cluster run states
/// (target, logical unit, service address) with its backing volume state.
/// Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Ok,
    Degraded,
    Bad,
    Unknown,
}

impl std::fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthVerdict::Ok => write!(f, "ok"),
            HealthVerdict::Degraded => write!(f, "degraded"),
            HealthVerdict::Bad => write!(f, "bad"),
            HealthVerdict::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Cluster Configuration Document
// =============================================================================

/// Version token of the cluster configuration document, used for optimistic
/// concurrency: a write carries the version it was derived from, and the
/// store rejects the write if the live document has moved past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CibVersion {
    pub admin_epoch: u64,
    pub epoch: u64,
    pub num_updates: u64,
}

impl CibVersion {
    pub fn new(admin_epoch: u64, epoch: u64, num_updates: u64) -> Self {
        Self {
            admin_epoch,
            epoch,
            num_updates,
        }
    }
}

impl std::fmt::Display for CibVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.admin_epoch, self.epoch, self.num_updates)
    }
}

/// One fetched revision of the cluster configuration document: the raw XML
/// exactly as the store produced it, plus its version token.
#[derive(Debug, Clone)]
pub struct CibDocument {
    pub xml: String,
    pub version: CibVersion,
}

// =============================================================================
// Cluster Store Port
// =============================================================================

/// Port for the cluster resource manager's configuration store.
///
/// The store provides its own commit-or-reject semantics; `replace` either
/// applies the whole submitted document or nothing. A version mismatch is
/// reported as a conflict, never silently overwritten. This port does not
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch the authoritative configuration document.
    async fn fetch(&self) -> Result<CibDocument>;

    /// Replace the configuration document, guarded by the version token the
    /// replacement was derived from.
    async fn replace(&self, xml: &str, expected: CibVersion) -> Result<()>;
}

// =============================================================================
// Storage Controller Port
// =============================================================================

/// Request to create one replicated backing volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRequest {
    /// Resource name within the storage controller (the target name)
    pub name: String,
    /// Logical unit number, doubling as the volume number
    pub lun: u8,
    /// Requested size in KiB
    pub size_kib: u64,
    /// Nodes eligible to hold a replica
    pub storage_nodes: Vec<String>,
}

/// Port for the distributed storage controller owning volume placement and
/// replication. Treated as a black box; replica management is its problem.
#[async_trait]
pub trait StorageController: Send + Sync {
    /// Create a replicated volume and return the block device path under
    /// which it is exposed on the storage nodes.
    async fn create_volume(&self, request: VolumeRequest) -> Result<String>;

    /// Delete the volume backing one logical unit.
    async fn delete_volume(&self, name: &str, lun: u8) -> Result<()>;

    /// Report the replication health of the named resource.
    async fn volume_state(&self, name: &str) -> Result<VolumeState>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterStoreRef = Arc<dyn ClusterStore>;
pub type StorageControllerRef = Arc<dyn StorageController>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_display() {
        assert_eq!(format!("{}", RunState::Running), "running");
        assert_eq!(format!("{}", RunState::Stopped), "stopped");
        assert_eq!(format!("{}", RunState::Unknown), "unknown");
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(format!("{}", HealthVerdict::Ok), "ok");
        assert_eq!(format!("{}", HealthVerdict::Degraded), "degraded");
        assert_eq!(format!("{}", HealthVerdict::Bad), "bad");
    }

    #[test]
    fn test_version_ordering() {
        let read = CibVersion::new(0, 5, 2);
        let advanced = CibVersion::new(0, 6, 0);
        assert!(advanced > read);
        assert_eq!(format!("{}", read), "0.5.2");

        // num_updates is the least significant component
        assert!(CibVersion::new(0, 5, 3) > read);
        assert!(CibVersion::new(1, 0, 0) > advanced);
    }
}
