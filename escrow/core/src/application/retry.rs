// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bounded retry for lock conflicts.
//!
//! Every engine operation is safe to re-run from scratch after a
//! [`EngineError::Conflict`] because conflicts roll the whole transaction
//! back. [`retry_on_conflict`] re-runs the operation a configured number of
//! times with exponential backoff and gives up by returning the last
//! conflict. No other error class is ever retried here.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based; first retry waits base_delay
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Runs `op`, retrying only on [`EngineError::Conflict`] up to the policy's
/// attempt budget.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Err(EngineError::Conflict(reason)) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Retrying after concurrency conflict"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
