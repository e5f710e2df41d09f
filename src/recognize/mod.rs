//! Recognition retry engine.
//!
//! Each queued page runs a small state machine: wait for the remote service
//! to be healthy, attempt recognition, and on a retryable failure wait a
//! fixed interval and loop. Backpressure (service full or unavailable) is
//! never an error, only a reason to wait; retryable failures retry without
//! bound so a queued page either completes or is explicitly cancelled —
//! it is never silently dropped. Fatal failures publish one
//! `recognition:error` event and mark the page failed.

pub mod adapter;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::ScanDocError;
use crate::events::{BusEvent, EventBus};
use crate::health::HealthSignal;
use crate::model::{PageStatus, RecognizeOptions};
use crate::scheduler::{TaskKind, TaskScheduler};
use crate::store::{self, Store};
use adapter::RecognitionAdapter;

/// Counts returned by [`RecognitionEngine::queue_batch`] and
/// [`RecognitionEngine::resume_batch`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct EngineInner {
    adapter: Arc<dyn RecognitionAdapter>,
    store: Arc<dyn Store>,
    health: Arc<dyn HealthSignal>,
    bus: Arc<EventBus>,
    retry_interval: Duration,
    options: RecognizeOptions,
}

/// Queues recognition tasks and drives them to success, fatal failure, or
/// cancellation.
pub struct RecognitionEngine {
    inner: Arc<EngineInner>,
    scheduler: TaskScheduler,
}

impl RecognitionEngine {
    pub fn new(
        config: &PipelineConfig,
        adapter: Arc<dyn RecognitionAdapter>,
        store: Arc<dyn Store>,
        health: Arc<dyn HealthSignal>,
        bus: Arc<EventBus>,
        scheduler: TaskScheduler,
    ) -> Self {
        RecognitionEngine {
            inner: Arc::new(EngineInner {
                adapter,
                store,
                health,
                bus,
                retry_interval: config.retry_interval(),
                options: RecognizeOptions {
                    prompt_type: config.prompt_type.clone(),
                },
            }),
            scheduler,
        }
    }

    /// Queue one page for recognition.
    ///
    /// Any in-flight task for the same page (recognition or generation) is
    /// cancelled first; the newest request wins. Fails only when the page
    /// image is absent from the store.
    pub async fn queue_recognition(&self, page_id: &str) -> Result<(), ScanDocError> {
        let image = self
            .inner
            .store
            .get_page_image(page_id)
            .await?
            .ok_or_else(|| ScanDocError::MissingPageImage {
                id: page_id.to_string(),
            })?;

        store::update_status(self.inner.store.as_ref(), page_id, PageStatus::PendingOcr).await?;
        self.inner.bus.publish(&BusEvent::RecognitionQueued {
            key: page_id.to_string(),
        });

        let inner = Arc::clone(&self.inner);
        let key = page_id.to_string();
        self.scheduler
            .submit(page_id, TaskKind::Recognition, move |token| async move {
                inner.run_with_retry(&key, &image, &token).await
            });
        Ok(())
    }

    /// Queue every page in `page_ids` that is not already on the
    /// recognition queue.
    ///
    /// Pages already `pending_ocr` or `recognizing` are skipped; pages
    /// whose image is missing count as failed. Everything else — including
    /// previously completed or failed pages — is (re-)queued.
    pub async fn queue_batch(&self, page_ids: &[String]) -> Result<BatchOutcome, ScanDocError> {
        let mut outcome = BatchOutcome::default();
        for id in page_ids {
            let status = self
                .inner
                .store
                .get_page(id)
                .await?
                .map(|page| page.status);
            if matches!(
                status,
                Some(PageStatus::PendingOcr) | Some(PageStatus::Recognizing)
            ) {
                outcome.skipped += 1;
                continue;
            }
            match self.queue_recognition(id).await {
                Ok(()) => outcome.queued += 1,
                Err(ScanDocError::MissingPageImage { id }) => {
                    warn!(page = %id, "skipping page with no stored image");
                    outcome.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            queued = outcome.queued,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "batch queued"
        );
        Ok(outcome)
    }

    /// Re-queue pages left mid-recognition by a previous run.
    ///
    /// The inverse selection of [`queue_batch`]: only pages stuck in
    /// `pending_ocr` or `recognizing` are picked up.
    pub async fn resume_batch(&self, page_ids: &[String]) -> Result<BatchOutcome, ScanDocError> {
        let mut outcome = BatchOutcome::default();
        for id in page_ids {
            let status = self
                .inner
                .store
                .get_page(id)
                .await?
                .map(|page| page.status);
            if !matches!(
                status,
                Some(PageStatus::PendingOcr) | Some(PageStatus::Recognizing)
            ) {
                outcome.skipped += 1;
                continue;
            }
            match self.queue_recognition(id).await {
                Ok(()) => outcome.queued += 1,
                Err(ScanDocError::MissingPageImage { id }) => {
                    warn!(page = %id, "cannot resume page with no stored image");
                    outcome.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if outcome.queued > 0 {
            info!(resumed = outcome.queued, "resumed interrupted recognitions");
        }
        Ok(outcome)
    }
}

impl EngineInner {
    /// One recognition task, start to finish.
    async fn run_with_retry(
        &self,
        key: &str,
        image: &[u8],
        token: &CancellationToken,
    ) -> Result<(), ScanDocError> {
        loop {
            if token.is_cancelled() {
                debug!(page = key, "recognition cancelled before attempt");
                return Ok(());
            }

            // Full and unavailable are one backpressure condition; only the
            // logged reason differs.
            if self.health.is_full() || !self.health.is_available() {
                let reason = if self.health.is_full() {
                    "recognition queue is full"
                } else {
                    "recognition service is unavailable"
                };
                info!(page = key, reason, "waiting before recognition attempt");
                if !self.delay(token).await {
                    return Ok(());
                }
                continue;
            }

            self.bus.publish(&BusEvent::RecognitionStart {
                key: key.to_string(),
            });
            store::update_status(self.store.as_ref(), key, PageStatus::Recognizing).await?;

            match self.adapter.process(image, &self.options, token).await {
                Ok(result) => {
                    // A task cancelled while the attempt was in flight must
                    // not persist the stale result or publish success.
                    if token.is_cancelled() {
                        debug!(page = key, "recognition cancelled mid-attempt");
                        return Ok(());
                    }
                    self.store.save_recognition(key, &result).await?;
                    store::update_status(self.store.as_ref(), key, PageStatus::OcrSuccess)
                        .await?;
                    self.bus.publish(&BusEvent::RecognitionSuccess {
                        key: key.to_string(),
                        result: Arc::new(result),
                    });
                    return Ok(());
                }
                Err(_) if token.is_cancelled() => {
                    debug!(page = key, "recognition cancelled mid-attempt");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    warn!(page = key, error = %e, "recognition attempt failed, will retry");
                    if !self.delay(token).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    self.bus.publish(&BusEvent::RecognitionError {
                        key: key.to_string(),
                        error: message.clone(),
                    });
                    store::record_error(self.store.as_ref(), key, &message).await?;
                    return Err(ScanDocError::Recognition(message));
                }
            }
        }
    }

    /// Sleep the retry interval. Returns `false` if the token fired first.
    async fn delay(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.retry_interval) => true,
        }
    }
}
