//! Fixed-delay attempt counter for establishing a homeserver connection.

use std::time::Duration;

use organ_shared::constants::RETRY_DELAY_MS;
use tracing::debug;

/// Counts connection attempts up to a bound, pausing a fixed delay between
/// them.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryCounter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Record an attempt.  Returns the delay to wait before it, or `None`
    /// once every attempt has been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempts += 1;
        debug!(attempt = self.attempts, of = self.max_attempts, "Retrying");
        Some(self.delay)
    }

    /// Sleep for the next delay.  Returns `false` once exhausted.
    pub async fn wait(&mut self) -> bool {
        match self.next_delay() {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
