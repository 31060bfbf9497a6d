//! Bounded readiness polling

use super::classify::is_transient;
use crate::config::PollSettings;
use crate::error::{FactoryError, Result};
use async_trait::async_trait;
use tracing::debug;

/// One readiness check of a started component
#[async_trait]
pub trait Probe: Send {
    type Output: Send;

    /// `Ok(None)` means "not ready yet"
    async fn probe(&mut self) -> Result<Option<Self::Output>>;
}

/// Run `probe` until it yields a value, at most `settings.max_iterations` times.
///
/// Transient failures count as "not ready yet". Any other failure is
/// returned as is on first occurrence.
pub async fn poll_until_ready<P: Probe>(
    phase: &str,
    probe: &mut P,
    settings: PollSettings,
) -> Result<P::Output> {
    for attempt in 1..=settings.max_iterations {
        match probe.probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!("{} not ready ({}/{})", phase, attempt, settings.max_iterations),
            Err(e) if is_transient(&e) => {
                debug!(
                    "{} not reachable ({}/{}): {}",
                    phase, attempt, settings.max_iterations, e
                );
            }
            Err(e) => return Err(e),
        }

        if attempt < settings.max_iterations {
            tokio::time::sleep(settings.interval).await;
        }
    }

    Err(FactoryError::Timeout {
        phase: phase.to_string(),
        attempts: settings.max_iterations,
    })
}
