//! Error types for the scandoc pipeline.
//!
//! Three distinct error types reflect three distinct failure surfaces:
//!
//! * [`ScanDocError`] — **Task-level**: a recognition or generation task for
//!   one page failed. Logged by the scheduler; other tasks keep running.
//!
//! * [`AdapterError`] — **Transport**: the remote recognition call failed.
//!   Classified by [`AdapterError::is_retryable`] into errors the retry
//!   engine waits out and errors that terminate the task.
//!
//! * [`AssembleError`] — **Input validation**: the recognition result lacks
//!   the data the reconstruction algorithm depends on.
//!
//! The separation keeps the retry policy auditable: retryability is a pure
//! function of the adapter error, decided in one place, with the message
//! heuristics for untyped errors isolated in [`retryable_message`].

use thiserror::Error;

/// Errors surfaced by a recognition or generation task.
///
/// A task's error never halts the scheduler or other tasks — the scheduler
/// logs it and moves on. The page itself is marked `error` with an appended
/// log entry; detailed error values stay inside the pipeline.
#[derive(Debug, Error)]
pub enum ScanDocError {
    /// The original page image was absent from the store. Fatal for the
    /// generation task: there is nothing to slice or embed.
    #[error("page image not found for page '{id}'")]
    MissingPageImage { id: String },

    /// The recognition adapter failed with a non-retryable error.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// Content reconstruction rejected its input.
    #[error("markdown assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    /// Cropping sub-images out of the page failed.
    #[error("image slicing failed for page '{id}': {detail}")]
    Slice { id: String, detail: String },

    /// A document builder (DOCX or sandwich PDF) failed.
    #[error("{subtype} builder failed: {detail}")]
    Builder { subtype: String, detail: String },

    /// The persistent store rejected a read or write.
    #[error("store failure: {0}")]
    Store(String),

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The task's cancellation token fired. Swallowed by the scheduler,
    /// never published as an event.
    #[error("task cancelled")]
    Cancelled,
}

/// Errors from the remote recognition call.
///
/// Variants mirror what the transport can actually tell us. Untyped
/// failures land in [`AdapterError::Other`] and fall back to message
/// heuristics for retry classification.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The remote service reported its queue is full. Backpressure, not a
    /// failure — the retry engine waits and tries again.
    #[error("recognition queue is full")]
    QueueFull,

    /// Connection refused, DNS failure, fetch-layer failure.
    #[error("network failure: {0}")]
    Network(String),

    /// The API answered with a non-2xx status.
    #[error("recognition API error: {status} {message}")]
    Api { status: u16, message: String },

    /// The call exceeded the transport's own deadline.
    #[error("recognition request timed out")]
    Timeout,

    /// Explicit rate-limit rejection. Not retried: external backoff will
    /// not fix a per-client quota.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The response body could not be decoded into a recognition result.
    #[error("invalid recognition response: {0}")]
    InvalidResponse(String),

    /// Anything the transport could not classify.
    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    /// Whether the retry engine should wait and try again.
    ///
    /// Retryable: queue-full backpressure, network failures, 5xx server
    /// errors, and timeouts. Fatal: rate limits, malformed responses, and
    /// anything else — retrying those loops forever on a condition that
    /// waiting will not fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::QueueFull => true,
            AdapterError::Network(_) => true,
            AdapterError::Api { status, .. } => (500..600).contains(status),
            AdapterError::Timeout => true,
            AdapterError::RateLimited => false,
            AdapterError::InvalidResponse(_) => false,
            AdapterError::Other(message) => retryable_message(message),
        }
    }
}

/// Message-based retry classification for untyped errors.
///
/// Rate-limit wording is checked first and wins: "rate limit exceeded" also
/// contains "limit", and an explicit quota rejection must never loop.
pub fn retryable_message(message: &str) -> bool {
    let m = message.to_lowercase();

    if m.contains("limit") || m.contains("at max") {
        return false;
    }

    is_network_message(&m) || is_server_error_message(&m) || m.contains("timeout")
}

fn is_network_message(m: &str) -> bool {
    m.contains("failed to fetch")
        || m.contains("load failed")
        || m.contains("network error")
        || m.contains("connection refused")
        || m.contains("dns")
}

/// An HTTP 5xx mentioned in prose, e.g. "OCR API Error: 503 Service
/// Unavailable". The space before the 5 keeps "HTTP/1.1 500" matching while
/// ignoring incidental numbers like "page 5".
fn is_server_error_message(m: &str) -> bool {
    m.contains(" 5") && (m.contains("error") || m.contains("api"))
}

/// Errors from the pure content-reconstruction function.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    /// `raw_text` was absent. The field is mandatory: it carries the
    /// positional tag grammar the matching algorithm depends on.
    #[error("recognition result is missing raw_text")]
    MissingRawText,
}
