//! Pipeline configuration.
//!
//! All behaviour knobs live in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across components and to diff two runs to
//! understand why their behaviour differs.

use crate::error::ScanDocError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by the scheduler, retry engine, and health monitor.
///
/// # Example
/// ```rust
/// use scandoc::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .endpoint("http://127.0.0.1:8001/ocr")
///     .retry_interval_ms(5000)
///     .build()
///     .unwrap();
/// assert_eq!(config.recognition_concurrency, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent recognition tasks. Default: 2.
    ///
    /// Recognition is network-bound; two in flight keeps the remote queue
    /// warm without flooding a single-GPU backend.
    pub recognition_concurrency: usize,

    /// Concurrent generation tasks. Default: 1.
    ///
    /// Generation is serialized because the downstream document builders
    /// are not safely concurrent in one process.
    pub generation_concurrency: usize,

    /// Fixed wait between retry attempts and backpressure re-checks, in
    /// milliseconds. Default: 5000.
    ///
    /// Retries are unbounded: a recognition task must eventually complete
    /// or be explicitly cancelled, never silently dropped.
    pub retry_interval_ms: u64,

    /// Recognition API endpoint.
    pub endpoint: String,

    /// Default prompt type sent with each recognition request.
    pub prompt_type: String,

    /// Health endpoint polled by the health monitor.
    pub health_endpoint: String,

    /// Health poll interval in milliseconds. Default: 5000.
    pub health_poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recognition_concurrency: 2,
            generation_concurrency: 1,
            retry_interval_ms: 5000,
            endpoint: "http://127.0.0.1:8001/ocr".to_string(),
            prompt_type: "document".to_string(),
            health_endpoint: "http://127.0.0.1:8001/health".to_string(),
            health_poll_interval_ms: 5000,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn recognition_concurrency(mut self, n: usize) -> Self {
        self.config.recognition_concurrency = n.max(1);
        self
    }

    pub fn generation_concurrency(mut self, n: usize) -> Self {
        self.config.generation_concurrency = n.max(1);
        self
    }

    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.retry_interval_ms = ms;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn prompt_type(mut self, prompt_type: impl Into<String>) -> Self {
        self.config.prompt_type = prompt_type.into();
        self
    }

    pub fn health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.health_endpoint = endpoint.into();
        self
    }

    pub fn health_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.health_poll_interval_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ScanDocError> {
        let c = &self.config;
        if c.endpoint.is_empty() {
            return Err(ScanDocError::InvalidConfig(
                "recognition endpoint must not be empty".into(),
            ));
        }
        if c.retry_interval_ms == 0 {
            return Err(ScanDocError::InvalidConfig(
                "retry interval must be ≥ 1ms".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.recognition_concurrency, 2);
        assert_eq!(c.generation_concurrency, 1);
        assert_eq!(c.retry_interval_ms, 5000);
    }

    #[test]
    fn concurrency_clamped_to_one() {
        let c = PipelineConfig::builder()
            .recognition_concurrency(0)
            .generation_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.recognition_concurrency, 1);
        assert_eq!(c.generation_concurrency, 1);
    }

    #[test]
    fn empty_endpoint_rejected() {
        let result = PipelineConfig::builder().endpoint("").build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_retry_interval_rejected() {
        let result = PipelineConfig::builder().retry_interval_ms(0).build();
        assert!(result.is_err());
    }
}
