//! Persistent store abstraction.
//!
//! The pipeline core never owns storage. [`Store`] is the seam to whatever
//! the host application persists pages and artifacts in; [`MemoryStore`]
//! is a map-backed implementation for tests and the one-shot CLI.

use crate::error::ScanDocError;
use crate::model::{Page, PageStatus, RecognitionResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key-value/object store consumed by the pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_page(&self, id: &str) -> Result<Option<Page>, ScanDocError>;
    async fn save_page(&self, page: Page) -> Result<(), ScanDocError>;

    async fn get_page_image(&self, id: &str) -> Result<Option<Vec<u8>>, ScanDocError>;

    async fn save_recognition(
        &self,
        id: &str,
        result: &RecognitionResult,
    ) -> Result<(), ScanDocError>;

    async fn save_page_markdown(&self, id: &str, content: &str) -> Result<(), ScanDocError>;
    async fn save_page_docx(&self, id: &str, bytes: Vec<u8>) -> Result<(), ScanDocError>;
    async fn save_page_pdf(&self, id: &str, bytes: Vec<u8>) -> Result<(), ScanDocError>;

    async fn get_extracted_image(&self, image_id: &str) -> Result<Option<Vec<u8>>, ScanDocError>;
    async fn save_extracted_image(
        &self,
        image_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ScanDocError>;
}

/// Transition a page's status, if the page exists.
pub async fn update_status(
    store: &dyn Store,
    id: &str,
    status: PageStatus,
) -> Result<(), ScanDocError> {
    if let Some(mut page) = store.get_page(id).await? {
        page.set_status(status);
        store.save_page(page).await?;
    }
    Ok(())
}

/// Mark a page failed and append the reason to its log.
///
/// This is the only failure surface the boundary sees: `status = error`
/// plus a log line. The error value itself stays inside the pipeline.
pub async fn record_error(
    store: &dyn Store,
    id: &str,
    message: &str,
) -> Result<(), ScanDocError> {
    if let Some(mut page) = store.get_page(id).await? {
        page.set_status(PageStatus::Error);
        page.push_log(message);
        store.save_page(page).await?;
    }
    Ok(())
}

/// Map-backed [`Store`] for tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    pages: Mutex<HashMap<String, Page>>,
    page_images: Mutex<HashMap<String, Vec<u8>>>,
    recognitions: Mutex<HashMap<String, RecognitionResult>>,
    markdown: Mutex<HashMap<String, String>>,
    docx: Mutex<HashMap<String, Vec<u8>>>,
    pdf: Mutex<HashMap<String, Vec<u8>>>,
    extracted: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a page and its image in one call.
    pub fn insert_page(&self, page: Page, image: Vec<u8>) {
        let id = page.id.clone();
        self.pages.lock().expect("pages lock").insert(id.clone(), page);
        self.page_images.lock().expect("images lock").insert(id, image);
    }

    pub fn markdown_for(&self, id: &str) -> Option<String> {
        self.markdown.lock().expect("markdown lock").get(id).cloned()
    }

    pub fn docx_for(&self, id: &str) -> Option<Vec<u8>> {
        self.docx.lock().expect("docx lock").get(id).cloned()
    }

    pub fn pdf_for(&self, id: &str) -> Option<Vec<u8>> {
        self.pdf.lock().expect("pdf lock").get(id).cloned()
    }

    pub fn recognition_for(&self, id: &str) -> Option<RecognitionResult> {
        self.recognitions
            .lock()
            .expect("recognitions lock")
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_page(&self, id: &str) -> Result<Option<Page>, ScanDocError> {
        Ok(self.pages.lock().expect("pages lock").get(id).cloned())
    }

    async fn save_page(&self, page: Page) -> Result<(), ScanDocError> {
        self.pages
            .lock()
            .expect("pages lock")
            .insert(page.id.clone(), page);
        Ok(())
    }

    async fn get_page_image(&self, id: &str) -> Result<Option<Vec<u8>>, ScanDocError> {
        Ok(self.page_images.lock().expect("images lock").get(id).cloned())
    }

    async fn save_recognition(
        &self,
        id: &str,
        result: &RecognitionResult,
    ) -> Result<(), ScanDocError> {
        self.recognitions
            .lock()
            .expect("recognitions lock")
            .insert(id.to_string(), result.clone());
        Ok(())
    }

    async fn save_page_markdown(&self, id: &str, content: &str) -> Result<(), ScanDocError> {
        self.markdown
            .lock()
            .expect("markdown lock")
            .insert(id.to_string(), content.to_string());
        Ok(())
    }

    async fn save_page_docx(&self, id: &str, bytes: Vec<u8>) -> Result<(), ScanDocError> {
        self.docx.lock().expect("docx lock").insert(id.to_string(), bytes);
        Ok(())
    }

    async fn save_page_pdf(&self, id: &str, bytes: Vec<u8>) -> Result<(), ScanDocError> {
        self.pdf.lock().expect("pdf lock").insert(id.to_string(), bytes);
        Ok(())
    }

    async fn get_extracted_image(&self, image_id: &str) -> Result<Option<Vec<u8>>, ScanDocError> {
        Ok(self
            .extracted
            .lock()
            .expect("extracted lock")
            .get(image_id)
            .cloned())
    }

    async fn save_extracted_image(
        &self,
        image_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ScanDocError> {
        self.extracted
            .lock()
            .expect("extracted lock")
            .insert(image_id.to_string(), bytes);
        Ok(())
    }
}
