//! Data model: pages, recognition results, and their serialised forms.
//!
//! [`RecognitionResult`] mirrors the fields consumed from the remote
//! recognition API and is immutable once produced. [`Page`] carries the
//! lifecycle status the pipeline components drive; the UI never mutates it
//! directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// A bounding box with its structural label, as returned by the recognition
/// service. Coordinates are `[x1, y1, x2, y2]` in the space described by
/// [`ImageDims`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledBox {
    pub label: String,
    #[serde(rename = "box")]
    pub rect: [f64; 4],
}

impl LabeledBox {
    pub fn new(label: impl Into<String>, rect: [f64; 4]) -> Self {
        Self {
            label: label.into(),
            rect,
        }
    }
}

/// The coordinate space the boxes are expressed in (page image pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageDims {
    pub w: f64,
    pub h: f64,
}

/// Output of one recognition attempt. Immutable once produced.
///
/// `raw_text` carries the positional tag grammar (`<|ref|>` / `<|det|>`)
/// the content-reconstruction algorithm depends on; `text` is the cleaned
/// display form. `raw_text` is optional at the wire level but mandatory for
/// assembly — see [`crate::assemble::assemble`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub success: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub boxes: Vec<LabeledBox>,
    #[serde(default)]
    pub image_dims: ImageDims,
}

/// Options forwarded to the recognition adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeOptions {
    pub prompt_type: String,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            prompt_type: "document".to_string(),
        }
    }
}

/// Page lifecycle status. Exactly one holds at a time; transitions are
/// driven exclusively by the pipeline components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    PendingRender,
    Rendering,
    Ready,
    PendingOcr,
    Recognizing,
    OcrSuccess,
    PendingGen,
    GeneratingMarkdown,
    MarkdownSuccess,
    GeneratingDocx,
    GeneratingPdf,
    Completed,
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::PendingRender => "pending_render",
            PageStatus::Rendering => "rendering",
            PageStatus::Ready => "ready",
            PageStatus::PendingOcr => "pending_ocr",
            PageStatus::Recognizing => "recognizing",
            PageStatus::OcrSuccess => "ocr_success",
            PageStatus::PendingGen => "pending_gen",
            PageStatus::GeneratingMarkdown => "generating_markdown",
            PageStatus::MarkdownSuccess => "markdown_success",
            PageStatus::GeneratingDocx => "generating_docx",
            PageStatus::GeneratingPdf => "generating_pdf",
            PageStatus::Completed => "completed",
            PageStatus::Error => "error",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only log entry on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLog {
    pub at: SystemTime,
    pub message: String,
}

/// A scanned page as the pipeline sees it. Owned by the external store;
/// the core only reads and writes status and derived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub status: PageStatus,
    /// Monotonically increasing sort order.
    pub order: u64,
    pub logs: Vec<PageLog>,
}

impl Page {
    pub fn new(id: impl Into<String>, order: u64) -> Self {
        Self {
            id: id.into(),
            status: PageStatus::PendingRender,
            order,
            logs: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: PageStatus) {
        self.status = status;
    }

    /// Append a log entry. Logs are append-only; nothing removes them.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.logs.push(PageLog {
            at: SystemTime::now(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_snake_case_roundtrip() {
        let json = serde_json::to_string(&PageStatus::GeneratingMarkdown).unwrap();
        assert_eq!(json, "\"generating_markdown\"");
        let back: PageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PageStatus::GeneratingMarkdown);
    }

    #[test]
    fn result_deserialises_wire_shape() {
        let json = r#"{
            "success": true,
            "text": "Hello",
            "raw_text": "<|ref|>text<|/ref|>",
            "boxes": [{"label": "text", "box": [1, 2, 3, 4]}],
            "image_dims": {"w": 100, "h": 200}
        }"#;
        let r: RecognitionResult = serde_json::from_str(json).unwrap();
        assert!(r.success);
        assert_eq!(r.boxes[0].rect, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.image_dims.w, 100.0);
    }

    #[test]
    fn result_tolerates_missing_optional_fields() {
        let r: RecognitionResult = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(r.raw_text.is_none());
        assert!(r.boxes.is_empty());
    }

    #[test]
    fn page_logs_append_only() {
        let mut page = Page::new("p1", 0);
        page.push_log("first");
        page.push_log("second");
        assert_eq!(page.logs.len(), 2);
        assert_eq!(page.logs[0].message, "first");
    }
}
