// src/core/circuit_breaker.rs — Backward-pass failure isolation
//
// Closed: attempts pass. After `threshold` consecutive failures: Open.
// Open: attempts are refused until `recovery_duration` has passed since the
// breaker tripped; the first attempt after that closes it again and its
// outcome counts from a clean slate.

use std::time::Duration;
use tokio::time::Instant;

use crate::infra::errors::ArcherError;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    consecutive_errors: u32,
    threshold: u32,
    is_open: bool,
    last_attempt_time: Option<Instant>,
    recovery_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_duration: Duration) -> Self {
        Self {
            consecutive_errors: 0,
            threshold: threshold.max(1),
            is_open: false,
            last_attempt_time: None,
            recovery_duration,
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Gate an attempt at `now`. Refusal leaves the state untouched.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), ArcherError> {
        if self.is_open {
            let since = self
                .last_attempt_time
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or(self.recovery_duration);
            if since < self.recovery_duration {
                let remaining = self.recovery_duration - since;
                return Err(ArcherError::CircuitOpen {
                    // round up so "0 seconds" is never reported while still open
                    retry_in_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
                });
            }
            tracing::info!(
                waited_secs = since.as_secs(),
                "Circuit breaker recovery window elapsed, closing"
            );
            self.is_open = false;
            self.consecutive_errors = 0;
        }
        self.last_attempt_time = Some(now);
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_errors += 1;
        self.last_attempt_time = Some(now);
        if !self.is_open && self.consecutive_errors >= self.threshold {
            self.is_open = true;
            tracing::warn!(
                consecutive_errors = self.consecutive_errors,
                recovery_secs = self.recovery_duration.as_secs(),
                "Circuit breaker opened"
            );
        }
    }
}
