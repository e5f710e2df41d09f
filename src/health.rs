//! Remote recognition service health: shared signal and HTTP poller.
//!
//! The retry engine never talks to the health endpoint itself. It polls a
//! [`HealthSignal`] before every attempt; "service unavailable" and "remote
//! queue full" are one backpressure condition as far as retrying goes, but
//! both are exposed separately so the engine can log the specific reason.
//!
//! [`HealthMonitor`] is the bundled poller: it refreshes a shared
//! [`HealthStatus`] on a fixed interval and is owned by the process
//! bootstrap, outside the pipeline core.

use crate::config::PipelineConfig;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Read side of the health state, consumed by the retry engine.
pub trait HealthSignal: Send + Sync {
    fn is_available(&self) -> bool;
    fn is_full(&self) -> bool;
}

/// Shared health flags, refreshed by an external poller.
///
/// Starts available and not full so a pipeline without a running monitor
/// (tests, one-shot CLI) does not wait forever on backpressure.
#[derive(Debug)]
pub struct HealthStatus {
    available: AtomicBool,
    full: AtomicBool,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            full: AtomicBool::new(false),
        }
    }
}

impl HealthStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_full(&self, full: bool) {
        self.full.store(full, Ordering::SeqCst);
    }
}

impl HealthSignal for HealthStatus {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_full(&self) -> bool {
        self.full.load(Ordering::SeqCst)
    }
}

/// Wire shape of the health endpoint response.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub queue_full: bool,
}

/// Polls the health endpoint on a fixed interval and updates a shared
/// [`HealthStatus`].
pub struct HealthMonitor {
    client: reqwest::Client,
    endpoint: String,
    interval: Duration,
    status: Arc<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(config: &PipelineConfig, status: Arc<HealthStatus>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.health_endpoint.clone(),
            interval: config.health_poll_interval(),
            status,
        }
    }

    /// Spawn the polling loop. It runs until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.poll_once().await;
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = token.cancelled() => {
                        debug!("health monitor stopped");
                        return;
                    }
                }
            }
        })
    }

    async fn poll_once(&self) {
        match self.fetch().await {
            Ok(response) => {
                let available = response.status == "ok" && response.model_loaded;
                self.status.set_available(available);
                self.status.set_full(response.queue_full);
                debug!(
                    available,
                    full = response.queue_full,
                    backend = %response.backend,
                    "health refreshed"
                );
            }
            Err(err) => {
                // Unreachable endpoint means unavailable, not an error to
                // surface: the retry engine treats it as backpressure.
                self.status.set_available(false);
                warn!(endpoint = %self.endpoint, %err, "health check failed");
            }
        }
    }

    async fn fetch(&self) -> Result<HealthResponse, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json::<HealthResponse>()
            .await
    }
}
