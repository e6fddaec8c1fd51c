// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential backoff for the data-access layer.
//!
//! Only errors reporting [`CourierError::is_transient`] are retried. The relay
//! never calls this; delivery there is at-most-once per attempt.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::CourierError;

/// Retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(50),
            cap: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_backoff<T, F, Fut>(policy: Backoff, what: &str, mut op: F) -> Result<T, CourierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CourierError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                debug!(operation = what, attempt, ?delay, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
