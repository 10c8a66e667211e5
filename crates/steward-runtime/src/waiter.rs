// SPDX-License-Identifier: Apache-2.0

//! Progress-bounded polling shared by shutdown waits and admin start/stop.
//!
//! A polled resource advertises a wait hint and a checkpoint. As long as the
//! checkpoint keeps advancing the resource gets more time; once it stalls for
//! longer than its own hint the wait fails with a timeout.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::error::{Result, StewardError};
use crate::status::ServiceState;

/// Shortest pause between two polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// Longest pause between two polls.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

/// One observation of a polled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ServiceState,
    pub checkpoint: u32,
    pub wait_hint: Duration,
}

impl StatusSnapshot {
    pub fn new(state: ServiceState, checkpoint: u32, wait_hint: Duration) -> Self {
        StatusSnapshot {
            state,
            checkpoint,
            wait_hint,
        }
    }
}

/// Pause between polls for a given wait hint: a tenth of it, within bounds.
pub fn poll_interval(wait_hint: Duration) -> Duration {
    (wait_hint / 10).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Polls `poll` until `target` holds for the polled state.
///
/// The first poll happens immediately. Returns the satisfying snapshot, or a
/// [`StewardError::Timeout`] naming `resource` once the checkpoint has not
/// advanced for the latest advertised wait hint.
pub async fn wait_until<P, T>(resource: &str, mut poll: P, target: T) -> Result<StatusSnapshot>
where
    P: FnMut() -> Result<StatusSnapshot>,
    T: Fn(ServiceState) -> bool,
{
    let mut snapshot = poll()?;
    if target(snapshot.state) {
        return Ok(snapshot);
    }

    let mut progress_at = Instant::now();
    let mut checkpoint = snapshot.checkpoint;

    loop {
        let interval = poll_interval(snapshot.wait_hint);
        let remaining = snapshot.wait_hint.saturating_sub(progress_at.elapsed());
        let nap = if remaining.is_zero() {
            interval
        } else {
            interval.min(remaining)
        };
        time::sleep(nap).await;

        snapshot = poll()?;
        info!(
            resource,
            state = %snapshot.state,
            checkpoint = snapshot.checkpoint,
            wait_hint_ms = snapshot.wait_hint.as_millis() as u64,
            "polled status"
        );

        if target(snapshot.state) {
            return Ok(snapshot);
        }

        if snapshot.checkpoint != checkpoint {
            progress_at = Instant::now();
            checkpoint = snapshot.checkpoint;
            continue;
        }

        let elapsed = progress_at.elapsed();
        if elapsed >= snapshot.wait_hint {
            warn!(
                resource,
                state = %snapshot.state,
                elapsed_ms = elapsed.as_millis() as u64,
                "no progress within wait hint"
            );
            return Err(StewardError::Timeout {
                resource: resource.to_string(),
                elapsed,
            });
        }
    }
}
