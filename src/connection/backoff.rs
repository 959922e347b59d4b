//! Startup connection with exponential backoff

use crate::transport::Transport;
use drone_sync_shared::{DroneError, DroneResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retry schedule for reaching the broker
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Attempts before giving up (0 means retry forever)
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after `attempt` failures (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Connect the transport, retrying `TransportUnavailable` with backoff
///
/// Other errors are returned immediately. Cancelling `shutdown` while waiting
/// aborts with the last connection error.
pub async fn connect_with_backoff(
    transport: &dyn Transport,
    policy: &BackoffPolicy,
    shutdown: &CancellationToken,
) -> DroneResult<()> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match transport.connect().await {
            Ok(()) => {
                info!(transport = transport.name(), attempt, "transport connected");
                return Ok(());
            }
            Err(e @ DroneError::TransportUnavailable(_)) => e,
            Err(e) => return Err(e),
        };

        if policy.max_attempts > 0 && attempt >= policy.max_attempts {
            warn!(
                transport = transport.name(),
                attempts = attempt,
                error = %err,
                "giving up on transport connection"
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            transport = transport.name(),
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            error = %err,
            "transport unavailable, retrying"
        );

        tokio::select! {
            _ = shutdown.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
