//! Generation orchestrator.
//!
//! Listens for `recognition:success` on the event bus and drives the
//! four-step document pipeline for that page: fetch the source image,
//! slice figures and assemble Markdown, build the DOCX, build the sandwich
//! PDF. The bus is the only coupling to the recognition side. Generation
//! tasks share the scheduler's key space with recognition, so re-running
//! recognition for a page cancels its in-flight generation.

pub mod builders;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assemble;
use crate::error::ScanDocError;
use crate::events::{BusEvent, EventBus, GenerationSubtype, Topic};
use crate::model::{PageStatus, RecognitionResult};
use crate::scheduler::{TaskKind, TaskScheduler};
use crate::slicer::ImageSlicer;
use crate::store::{self, Store};
use builders::{DocumentBuilder, PdfBuilder};

struct OrchestratorInner {
    store: Arc<dyn Store>,
    slicer: Arc<dyn ImageSlicer>,
    docx: Arc<dyn DocumentBuilder>,
    pdf: Arc<dyn PdfBuilder>,
    bus: Arc<EventBus>,
    scheduler: TaskScheduler,
}

/// Chains Markdown, DOCX, and sandwich-PDF construction for recognized
/// pages.
pub struct GenerationOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        slicer: Arc<dyn ImageSlicer>,
        docx: Arc<dyn DocumentBuilder>,
        pdf: Arc<dyn PdfBuilder>,
        bus: Arc<EventBus>,
        scheduler: TaskScheduler,
    ) -> Self {
        GenerationOrchestrator {
            inner: Arc::new(OrchestratorInner {
                store,
                slicer,
                docx,
                pdf,
                bus,
                scheduler,
            }),
        }
    }

    /// Subscribe to `recognition:success` so every recognized page flows
    /// into generation. Call once at bootstrap.
    pub fn attach(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.bus.on(Topic::RecognitionSuccess, move |event| {
            if let BusEvent::RecognitionSuccess { key, result } = event {
                inner.queue_generation(key.clone(), Arc::clone(result));
            }
        });
    }

    /// Queue generation for one page directly, bypassing the bus.
    pub fn queue_generation(&self, key: String, result: Arc<RecognitionResult>) {
        self.inner.queue_generation(key, result);
    }
}

impl OrchestratorInner {
    fn queue_generation(self: &Arc<Self>, key: String, result: Arc<RecognitionResult>) {
        self.bus
            .publish(&BusEvent::GenerationQueued { key: key.clone() });
        let inner = Arc::clone(self);
        let task_key = key.clone();
        self.scheduler
            .submit(&task_key, TaskKind::Generation, move |token| async move {
                inner.generate_all(&key, &result, &token).await
            });
    }

    /// The full pipeline for one page, bracketed by the `all` event pair.
    async fn generate_all(
        &self,
        key: &str,
        result: &RecognitionResult,
        token: &CancellationToken,
    ) -> Result<(), ScanDocError> {
        self.bus.publish(&BusEvent::GenerationStart {
            key: key.to_string(),
            subtype: GenerationSubtype::All,
        });
        store::update_status(self.store.as_ref(), key, PageStatus::PendingGen).await?;

        match self.run_steps(key, result, token).await {
            Ok(()) => {
                store::update_status(self.store.as_ref(), key, PageStatus::Completed).await?;
                self.bus.publish(&BusEvent::GenerationSuccess {
                    key: key.to_string(),
                    subtype: GenerationSubtype::All,
                });
                Ok(())
            }
            Err(ScanDocError::Cancelled) => {
                // No event, no status change. The scheduler swallows this.
                debug!(page = key, "generation cancelled");
                Err(ScanDocError::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                self.bus.publish(&BusEvent::GenerationError {
                    key: key.to_string(),
                    subtype: GenerationSubtype::All,
                    error: message.clone(),
                });
                store::record_error(self.store.as_ref(), key, &message).await?;
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        key: &str,
        result: &RecognitionResult,
        token: &CancellationToken,
    ) -> Result<(), ScanDocError> {
        checkpoint(token)?;
        let image = self
            .store
            .get_page_image(key)
            .await?
            .ok_or_else(|| ScanDocError::MissingPageImage {
                id: key.to_string(),
            })?;

        let markdown = self
            .step(key, GenerationSubtype::Markdown, token, async {
                store::update_status(
                    self.store.as_ref(),
                    key,
                    PageStatus::GeneratingMarkdown,
                )
                .await?;
                let image_map = self.slicer.slice_images(key, &image, &result.boxes).await?;
                let markdown = assemble::assemble(result, &image_map)?;
                checkpoint(token)?;
                self.store.save_page_markdown(key, &markdown).await?;
                store::update_status(self.store.as_ref(), key, PageStatus::MarkdownSuccess)
                    .await?;
                Ok(markdown)
            })
            .await?;

        self.step(key, GenerationSubtype::Docx, token, async {
            store::update_status(self.store.as_ref(), key, PageStatus::GeneratingDocx).await?;
            let bytes = self.docx.build(&markdown).await.map_err(|detail| {
                ScanDocError::Builder {
                    subtype: "docx".to_string(),
                    detail,
                }
            })?;
            checkpoint(token)?;
            self.store.save_page_docx(key, bytes).await?;
            Ok(())
        })
        .await?;

        self.step(key, GenerationSubtype::Pdf, token, async {
            store::update_status(self.store.as_ref(), key, PageStatus::GeneratingPdf).await?;
            let bytes = self.pdf.build(&image, result).await.map_err(|detail| {
                ScanDocError::Builder {
                    subtype: "pdf".to_string(),
                    detail,
                }
            })?;
            checkpoint(token)?;
            self.store.save_page_pdf(key, bytes).await?;
            Ok(())
        })
        .await?;

        checkpoint(token)?;
        Ok(())
    }

    /// Run one pipeline step, bracketed by its subtype events.
    ///
    /// The token is checked before the step begins; a step aborted mid-way
    /// returns [`ScanDocError::Cancelled`] from its own checkpoints, which
    /// passes through silently. Any other error is published on the step's
    /// topic before propagating.
    async fn step<T>(
        &self,
        key: &str,
        subtype: GenerationSubtype,
        token: &CancellationToken,
        body: impl std::future::Future<Output = Result<T, ScanDocError>>,
    ) -> Result<T, ScanDocError> {
        checkpoint(token)?;
        self.bus.publish(&BusEvent::GenerationStart {
            key: key.to_string(),
            subtype,
        });

        match body.await {
            Ok(value) => {
                // The final persist may race with a cancellation. Re-check
                // before announcing success so a cancelled step stays silent.
                checkpoint(token)?;
                self.bus.publish(&BusEvent::GenerationSuccess {
                    key: key.to_string(),
                    subtype,
                });
                Ok(value)
            }
            Err(ScanDocError::Cancelled) => Err(ScanDocError::Cancelled),
            Err(e) => {
                self.bus.publish(&BusEvent::GenerationError {
                    key: key.to_string(),
                    subtype,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), ScanDocError> {
    if token.is_cancelled() {
        Err(ScanDocError::Cancelled)
    } else {
        Ok(())
    }
}
