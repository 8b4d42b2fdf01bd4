/// Configuration for the commit pipeline
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on retries; the backoff doubles per attempt
const MAX_SUPPORTED_PERSIST_RETRIES: u32 = 16;

/// Settings for [`LocalCommitDispatcher`](crate::services::LocalCommitDispatcher)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommitConfig {
    /// Buffered commit events per subscriber before it lags
    pub event_channel_capacity: usize,

    /// How long `wait_for_transaction_applied` waits for an acknowledgement
    pub ack_timeout_ms: u64,

    /// Persistence retries after the first attempt (0 = single attempt)
    pub max_persist_retries: u32,

    /// Base delay before the first retry, doubled on each further retry
    pub retry_backoff_ms: u64,

    /// Settled transactions whose outcome `wait_for_transaction_applied` can
    /// still report. Oldest outcomes are forgotten first.
    pub settled_retention: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 256,
            ack_timeout_ms: 10_000,
            max_persist_retries: 3,
            retry_backoff_ms: 10,
            settled_retention: 1024,
        }
    }
}

impl CommitConfig {
    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("Invalid commit config JSON")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read commit config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        if self.ack_timeout_ms == 0 {
            return Err("ack_timeout_ms must be greater than 0".to_string());
        }

        if self.settled_retention == 0 {
            return Err("settled_retention must be greater than 0".to_string());
        }

        if self.max_persist_retries > MAX_SUPPORTED_PERSIST_RETRIES {
            return Err(format!(
                "max_persist_retries cannot exceed {}",
                MAX_SUPPORTED_PERSIST_RETRIES
            ));
        }

        Ok(())
    }

    /// Delay before retry number `attempt` (0-based): `retry_backoff_ms * 2^attempt`
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.retry_backoff_ms
            .saturating_mul(1u64 << attempt.min(MAX_SUPPORTED_PERSIST_RETRIES))
    }
}
