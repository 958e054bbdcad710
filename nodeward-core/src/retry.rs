// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry budget for calls against the cluster store.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Total wall time across all attempts.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            budget: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Calls `f` until it succeeds, attempts run out, the budget is spent, or
    /// `cancel` fires. The last error is returned.
    pub async fn execute<F, T>(&self, cancel: &CancellationToken, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let deadline = Instant::now() + self.budget;
        let mut attempt = 0;
        let mut delay = self.base_delay;

        loop {
            attempt += 1;
            let err = match f() {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };
            let now = Instant::now();
            if attempt >= self.max_attempts || now + delay > deadline {
                return Err(err.context(format!("{} failed after {} attempts", what, attempt)));
            }
            warn!(operation = what, attempt, error = %format!("{:#}", err), "retrying");
            tokio::select! {
                _ = cancel.cancelled() => return Err(anyhow!("{} cancelled", what)),
                _ = sleep(delay) => {}
            }
            delay = std::cmp::min(
                Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier),
                self.max_delay,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            budget: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let out = quick(5)
            .execute(&CancellationToken::new(), "fetch", || {
                calls += 1;
                if calls < 3 {
                    bail!("transient");
                }
                Ok(calls)
            })
            .await
            .unwrap();
        assert_eq!(out, 3);
    }

    #[tokio::test]
    async fn stops_at_attempt_limit() {
        let mut calls = 0;
        let err = quick(4)
            .execute(&CancellationToken::new(), "fetch", || -> Result<()> {
                calls += 1;
                bail!("down")
            })
            .await
            .unwrap_err();
        assert_eq!(calls, 4);
        assert!(format!("{:#}", err).contains("down"));
    }

    #[tokio::test]
    async fn budget_cuts_retries_short() {
        let policy = RetryPolicy {
            budget: Duration::from_millis(0),
            ..quick(20)
        };
        let mut calls = 0;
        let _ = policy
            .execute(&CancellationToken::new(), "fetch", || -> Result<()> {
                calls += 1;
                bail!("down")
            })
            .await;
        assert_eq!(calls, 1);
    }
}
