//! Exponential-backoff connection attempts.
//!
//! Opening a session connects the profile's socket with
//! [`connect_with_backoff`], which retries a bounded number of times with
//! growing delays and gives up early if the [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Total connection attempts, at least one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to `max_delay`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Connect `client`, retrying with backoff.
///
/// Returns the last connection error once every attempt failed, or a
/// [`ComfyUIClientError::Connection`] saying so if `cancel` fired first.
pub async fn connect_with_backoff(
    client: &ComfyUIClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Result<ComfyUIConnection, ComfyUIClientError> {
    let attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ComfyUIClientError::Connection("connect cancelled".to_string()));
            }
            result = client.connect() => match result {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::warn!(
                        profile = client.profile(),
                        attempt,
                        attempts,
                        error = %e,
                        "Connect attempt failed",
                    );
                    last_error = Some(e);
                }
            }
        }

        if attempt < attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ComfyUIClientError::Connection("connect cancelled".to_string()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, config);
        }
    }

    Err(last_error
        .unwrap_or_else(|| ComfyUIClientError::Connection("no connection attempt made".into())))
}
