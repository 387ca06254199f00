//! Run-state probing
//!
//! Extracts the live run state of one target's footprint from a parsed
//! configuration snapshot. Pure reads; no side effects. A declaration that
//! never made it into the status section reports `Unknown`, which callers
//! must not conflate with `Stopped`.

use crate::cluster::builder::{ip_primitive_name, lu_primitive_name};
use crate::cluster::config::ClusterConfiguration;
use crate::domain::ports::RunState;
use std::collections::BTreeMap;

/// Observed run states for one target's footprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRunStates {
    pub target: RunState,
    pub service_ip: RunState,
    pub luns: BTreeMap<u8, RunState>,
}

/// Probe the run state of a target, its service address and each of its
/// logical units.
pub fn probe(config: &ClusterConfiguration, target: &str) -> TargetRunStates {
    let Some(record) = config.target(target) else {
        return TargetRunStates {
            target: RunState::Unknown,
            service_ip: RunState::Unknown,
            luns: BTreeMap::new(),
        };
    };

    let luns = record
        .luns
        .iter()
        .map(|&lun| (lun, config.run_state(&lu_primitive_name(target, lun))))
        .collect();

    TargetRunStates {
        target: config.run_state(&record.primitive),
        service_ip: config.run_state(&ip_primitive_name(target)),
        luns,
    }
}
