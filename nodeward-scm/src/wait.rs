// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done,
    TimedOut,
    Cancelled,
}

/// Evaluates `condition` immediately, then every `interval` until it holds,
/// `timeout` elapses, or `cancel` fires. The condition always gets one last
/// look at the deadline.
pub async fn poll_immediate<F, E>(
    cancel: &CancellationToken,
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<PollOutcome, E>
where
    F: FnMut() -> Result<bool, E>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        if condition()? {
            return Ok(PollOutcome::Done);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut);
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = sleep(nap) => {}
        }
    }
}
