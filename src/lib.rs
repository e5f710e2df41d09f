//! # scandoc
//!
//! Convert scanned pages into structured documents: Markdown, DOCX, and a
//! searchable (image + invisible text) sandwich PDF.
//!
//! ## Why this crate?
//!
//! The engineering here is not the document encoders — it is the
//! asynchronous pipeline around a flaky remote recognition service: a
//! concurrency-bounded scheduler where the newest request per page wins, a
//! health-aware retry loop that never silently drops a page, an event bus
//! decoupling recognition from generation, and a geometry-based assembler
//! that places extracted figures back into the recognized text from noisy,
//! possibly mis-scaled bounding boxes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image
//!  │
//!  ├─ 1. Queue     TaskScheduler admits the page (cancel-on-replace)
//!  ├─ 2. Recognize retry loop → HTTP recognition service (concurrency 2)
//!  ├─ 3. Publish   recognition:success on the EventBus
//!  ├─ 4. Generate  orchestrator, one page at a time:
//!  │               slice figures → assemble Markdown → DOCX → sandwich PDF
//!  └─ 5. Persist   artifacts and page status through the Store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scandoc::{
//!     EventBus, HealthStatus, HttpRecognitionAdapter, MemoryStore, Page,
//!     PipelineConfig, RecognitionEngine, TaskScheduler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     store.insert_page(Page::new("page-1", 0), std::fs::read("page-1.png")?);
//!
//!     let engine = RecognitionEngine::new(
//!         &config,
//!         Arc::new(HttpRecognitionAdapter::new(&config)),
//!         store.clone(),
//!         Arc::new(HealthStatus::new()),
//!         Arc::new(EventBus::new()),
//!         TaskScheduler::new(config.recognition_concurrency, config.generation_concurrency),
//!     );
//!     engine.queue_recognition("page-1").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scandoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scandoc = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod events;
pub mod generate;
pub mod health;
pub mod model;
pub mod recognize;
pub mod scheduler;
pub mod slicer;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::assemble;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{AdapterError, AssembleError, ScanDocError};
pub use events::{BusEvent, EventBus, GenerationSubtype, Topic};
pub use generate::builders::{DocumentBuilder, PdfBuilder};
pub use generate::GenerationOrchestrator;
pub use health::{HealthMonitor, HealthSignal, HealthStatus};
pub use model::{ImageDims, LabeledBox, Page, PageStatus, RecognitionResult, RecognizeOptions};
pub use recognize::adapter::{HttpRecognitionAdapter, RecognitionAdapter};
pub use recognize::{BatchOutcome, RecognitionEngine};
pub use scheduler::{QueueStats, TaskKind, TaskScheduler};
pub use slicer::{ImageSlicer, PngImageSlicer};
pub use store::{MemoryStore, Store};
