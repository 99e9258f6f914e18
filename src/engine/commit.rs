use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::PersistenceGateway;
use crate::types::{ReorderItem, Scope};

use super::Config;

/// Sends reorder commits through the gateway, retrying per the configured policy.
pub struct CommitManager<G> {
    gateway: Arc<G>,
    max_retries: u32,
    base_delay: Duration,
}

impl<G> CommitManager<G> {
    /// Creates a new CommitManager
    pub fn new(gateway: Arc<G>, config: &Config) -> Self {
        Self {
            gateway,
            max_retries: config.commit_max_retries,
            base_delay: config.commit_retry_base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): grows by 1.5x per attempt plus up to 50% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.mul_f32(1.5f32.powi(attempt as i32));
        let jitter_ms = (delay.as_millis() / 2) as u64;
        delay + Duration::from_millis(rand::random_range(0..=jitter_ms))
    }

    /// Commits the full ordering.
    ///
    /// The gateway is all-or-nothing, so resending the same ordering after a
    /// failure is safe.
    pub async fn commit<P>(&self, scope: &Scope, items: &[ReorderItem]) -> Result<()>
    where
        G: PersistenceGateway<P>,
    {
        let mut retry_count = 0;
        loop {
            let start = tokio::time::Instant::now();
            match self.gateway.commit_reorder(scope, items).await {
                Ok(()) => {
                    info!(
                        scope = %scope,
                        items = items.len(),
                        elapsed = ?start.elapsed(),
                        "Reorder committed"
                    );
                    return Ok(());
                }
                Err(e) => {
                    if retry_count >= self.max_retries {
                        return Err(e);
                    }
                    retry_count += 1;
                    let delay = self.backoff(retry_count);
                    warn!(
                        "Commit failed (attempt {}/{}), retrying in {:?}: {}",
                        retry_count, self.max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
