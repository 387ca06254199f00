//! Target-ID allocation
//!
//! Every iSCSI target in the cluster carries a small numeric target ID that
//! must be unique across the whole configuration. Allocation is stateless and
//! deterministic: the smallest unused ID wins, so repeated runs over the same
//! configuration always pick the same ID.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Highest assignable target ID (inclusive)
pub const MAX_TARGET_ID: u8 = u8::MAX;

/// A cluster-wide unique iSCSI target identifier.
pub type TargetId = u8;

/// Pick the smallest target ID in `0..=MAX_TARGET_ID` not present in `used`.
///
/// The set must come from a freshly read configuration snapshot; the
/// allocator holds no state between calls, and a concurrent allocation by
/// another actor is caught by the version check at write time, not here.
pub fn allocate(used: &BTreeSet<TargetId>) -> Result<TargetId> {
    for candidate in 0..=MAX_TARGET_ID {
        if !used.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(Error::TargetIdsExhausted { max: MAX_TARGET_ID })
}
