//! Polling worker
//!
//! Pulls claims waiting for verification in small batches and runs them
//! through the pipeline one at a time, pausing between claims so cloud
//! providers are not flooded. A failure on one claim is logged and the batch
//! moves on; a failure to fetch the batch backs the loop off.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use core_kernel::PortError;
use domain_verification::{ClaimStore, VerificationPipeline};

use crate::config::AgentConfig;

/// Cadence of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub batch_size: u32,
    pub claim_pause: Duration,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            claim_pause: Duration::from_secs(2),
            poll_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(60),
        }
    }
}

impl From<&AgentConfig> for WorkerSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            claim_pause: config.claim_pause(),
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
        }
    }
}

/// Counts of one polled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub verified: usize,
    pub failed: usize,
}

pub struct Worker {
    pipeline: Arc<VerificationPipeline>,
    store: Arc<dyn ClaimStore>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        pipeline: Arc<VerificationPipeline>,
        store: Arc<dyn ClaimStore>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            pipeline,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> WorkerSettings {
        self.settings
    }

    /// Fetches one batch and verifies every claim in it
    ///
    /// Stops early, between claims, once `shutdown` flips to true.
    #[instrument(skip(self, shutdown))]
    pub async fn run_batch(&self, shutdown: &watch::Receiver<bool>) -> Result<BatchReport, PortError> {
        let claims = self.store.fetch_pending(self.settings.batch_size).await?;
        let mut report = BatchReport {
            fetched: claims.len(),
            ..Default::default()
        };
        if claims.is_empty() {
            return Ok(report);
        }
        info!(count = claims.len(), "Processing pending claims");

        for (index, mut claim) in claims.into_iter().enumerate() {
            if *shutdown.borrow() {
                info!("Shutdown requested, leaving the rest of the batch");
                break;
            }
            if index > 0 && !self.settings.claim_pause.is_zero() {
                tokio::time::sleep(self.settings.claim_pause).await;
            }

            let claim_id = claim.id;
            match self.pipeline.process(&mut claim).await {
                Ok(_) => report.verified += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(claim_id = %claim_id, error = %e, "Failed to verify claim");
                }
            }
        }
        Ok(report)
    }

    /// Polls until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.settings.batch_size,
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Verification worker started"
        );

        loop {
            let wait = match self.run_batch(&shutdown).await {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs(),
                        "Polling failed, backing off"
                    );
                    self.settings.error_backoff
                }
            };

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Verification worker stopped");
    }
}
