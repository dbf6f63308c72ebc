//! Retrying sink wrapper
//!
//! Every configured sink runs under this wrapper: transient write failures
//! are retried with jittered exponential backoff. Only after the attempts
//! are exhausted does the error surface to the runtime, which then stops
//! without checkpointing, so nothing is lost.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;

use crate::common::{Attributes, SinkError};
use crate::AttributedSink;

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;

/// Backoff policy for sink writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), with ±25% jitter
    fn delay(&self, retry: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            .min(self.max_backoff);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        base.mul_f64(jitter)
    }
}

/// Sink wrapper applying the retry policy to every write
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: AttributedSink> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: AttributedSink> AttributedSink for RetryingSink<S> {
    async fn write(&self, bytes: Bytes, attributes: &Attributes) -> Result<(), SinkError> {
        let mut last = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.inner.write(bytes.clone(), attributes).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "sink write failed"
                    );
                    last = Some(e);
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay(attempt)).await;
                    }
                }
            }
        }

        Err(SinkError::Exhausted {
            attempts: self.policy.max_attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.inner.flush().await
    }
}
