//! iSCSI Target Operator
//!
//! Provisions and tears down highly-available iSCSI block targets on top of
//! a replicated storage layer by coordinating two independently-failing
//! subsystems: the cluster resource manager's versioned configuration
//! document, which describes which services run where, and a distributed
//! storage controller, which owns volume placement and replication.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     CLI / REST front door                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │                         Orchestrator                          │
//! │      create / delete / list, phase-by-phase sequencing        │
//! ├───────────────────────────┬───────────────────────────────────┤
//! │   Cluster control core    │      Storage controller client    │
//! │  snapshot parsing, target │      volume create/delete and     │
//! │  IDs, declaration builder,│      replication state queries    │
//! │  run-state probing        │                                   │
//! ├───────────────────────────┼───────────────────────────────────┤
//! │   cluster store (CIB,     │      LINSTOR REST API             │
//! │   optimistic versioning)  │                                   │
//! └───────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cluster`]: configuration document parsing, declarations, probing
//! - [`storage`]: storage controller adapters
//! - [`health`]: run-state and volume-state aggregation
//! - [`controlplane`]: orchestrator and REST API
//! - [`domain`]: core types and port traits
//! - [`error`]: error types and exit codes

pub mod cluster;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod health;
pub mod storage;

// Re-export commonly used types
pub use cluster::{
    CibAdminConfig, CibAdminStore, ClusterConfiguration, DeclarationKind, DeclarationSet,
    TargetParams, TargetRecord, TargetRunStates,
};

pub use controlplane::{
    ApiServer, ApiServerConfig, ClusterOverview, CreateRequest, LunHealth, Orchestrator,
    TargetHealth,
};

pub use domain::ports::{
    CibDocument, CibVersion, ClusterStore, HealthVerdict, RunState, StorageController,
    VolumeRequest, VolumeState,
};

pub use error::{Error, Result, EXIT_ACTION_FAILED, EXIT_INVALID_PARAMETER, EXIT_SUCCESS};

pub use storage::{LinstorClient, LinstorConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
