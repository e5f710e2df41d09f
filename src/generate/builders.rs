//! Document-builder seams.
//!
//! The byte layout of DOCX and PDF output is out of scope here; the
//! orchestrator only needs the input/output contracts. Concrete encoders
//! plug in behind these traits.

use async_trait::async_trait;

use crate::model::RecognitionResult;

/// Turns assembled Markdown into a word-processor document.
#[async_trait]
pub trait DocumentBuilder: Send + Sync {
    async fn build(&self, markdown: &str) -> Result<Vec<u8>, String>;
}

/// Builds a sandwich PDF: the page image as a visible raster layer plus an
/// invisible text layer positioned from the recognized box coordinates.
#[async_trait]
pub trait PdfBuilder: Send + Sync {
    async fn build(&self, image: &[u8], result: &RecognitionResult) -> Result<Vec<u8>, String>;
}
