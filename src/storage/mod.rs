//! Storage controller adapters
//!
//! Adapters for the replicated storage layer backing iSCSI logical units.

pub mod linstor;

pub use linstor::*;
