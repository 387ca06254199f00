//! Health aggregation
//!
//! Combines one logical unit's cluster run states (target, logical unit,
//! service address) with the storage controller's volume state into a single
//! verdict for display and monitoring.
//!
//! The precedence below is ordered and first-match-wins; callers and tests
//! depend on it exactly:
//!
//! 1. any input `Unknown` ⇒ `Unknown` - partial information is never
//!    presented as confidently healthy or unhealthy
//! 2. volume `Bad`, or one run state `Stopped` while the others run ⇒ `Bad`
//! 3. volume `Degraded` with everything running ⇒ `Degraded`
//! 4. everything running on a healthy volume ⇒ `Ok`
//! 5. anything else (e.g. a cleanly stopped unit) ⇒ `Degraded`

use crate::domain::ports::{HealthVerdict, RunState, VolumeState};

/// Aggregate one logical unit's observed states into a verdict.
pub fn aggregate(
    target: RunState,
    service_ip: RunState,
    lun: RunState,
    volume: VolumeState,
) -> HealthVerdict {
    let run_states = [target, service_ip, lun];

    if run_states.contains(&RunState::Unknown) || volume == VolumeState::Unknown {
        return HealthVerdict::Unknown;
    }

    let running = run_states.iter().filter(|s| **s == RunState::Running).count();
    let stopped = run_states.len() - running;

    if volume == VolumeState::Bad || (stopped > 0 && running > 0) {
        return HealthVerdict::Bad;
    }

    if running == run_states.len() {
        return match volume {
            VolumeState::Ok => HealthVerdict::Ok,
            _ => HealthVerdict::Degraded,
        };
    }

    // Remaining combinations have every run state stopped on non-bad
    // storage: an intentionally-down unit, not a broken one.
    HealthVerdict::Degraded
}
