use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::retry::RetryAttempt;

/// Why a message was routed to the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All retry attempts exhausted on a retryable failure.
    MaxRetriesExceeded,
    /// Payload could not be decoded or failed validation.
    DeserializationError,
}

impl DlqErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How [`DlqEnvelope::payload`] carries the original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// The original bytes were a JSON document, embedded as-is.
    Json,
    /// The original bytes were not JSON and are carried as a JSON string.
    Text,
}

/// Envelope for transporting failed messages to the DLQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Key of the original message.
    pub key: Option<String>,
    /// Original message payload.
    pub payload: Box<RawValue>,
    pub payload_format: PayloadFormat,
    /// Machine-readable error code.
    pub error_code: DlqErrorCode,
    /// Human-readable error message.
    pub error_message: String,
    /// History of attempts before reaching DLQ.
    pub retry_history: Vec<RetryAttempt>,
    pub failed_at: DateTime<Utc>,
}

impl DlqEnvelope {
    pub fn new(
        key: Option<String>,
        raw: &[u8],
        error_code: DlqErrorCode,
        error_message: impl Into<String>,
        retry_history: Vec<RetryAttempt>,
    ) -> Result<Self, serde_json::Error> {
        let (payload, payload_format) = match serde_json::from_slice::<Box<RawValue>>(raw) {
            Ok(json) => (json, PayloadFormat::Json),
            Err(_) => (
                serde_json::value::to_raw_value(&String::from_utf8_lossy(raw))?,
                PayloadFormat::Text,
            ),
        };

        Ok(Self {
            key,
            payload,
            payload_format,
            error_code,
            error_message: error_message.into(),
            retry_history,
            failed_at: Utc::now(),
        })
    }
}
