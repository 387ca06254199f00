//! Control plane
//!
//! The orchestration layer that sequences storage volume operations with
//! cluster declaration operations, plus the REST front door.

pub mod api;
pub mod orchestrator;

pub use api::*;
pub use orchestrator::*;
