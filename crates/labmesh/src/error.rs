// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! Two families live here:
//! - [`LabmeshError`]: Rust-side failures returned from API calls
//!   (registration, construction, publishing).
//! - [`ErrorPayload`] / [`ErrorCode`]: wire-visible error records that travel
//!   inside packets and are delivered to error callbacks.

use crate::config::ConfigError;
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type for labmesh operations.
pub type Result<T> = std::result::Result<T, LabmeshError>;

/// Errors returned by labmesh API calls.
#[derive(Debug, Error)]
pub enum LabmeshError {
    #[error("Invalid topic segment '{segment}': {reason}")]
    InvalidSegment {
        segment: String,
        reason: &'static str,
    },

    #[error("Topic has no segments")]
    EmptyTopic,

    #[error("A request handler is already registered at '{0}'")]
    DuplicateHandler(String),

    #[error("Path '{0}' is not accepted by the dispatch tree")]
    Unroutable(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Callback executor is shut down")]
    ExecutorShutdown,

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Missing required dependency: {0}")]
    MissingDependency(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Application-defined codes must be strictly below this value.
pub const APPLICATION_CODE_LIMIT: i32 = -100;

/// Error code carried in an [`ErrorPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    None,
    Decoding,
    Validation,
    Processing,
    Timeout,
    EmptyPayload,
    /// Application range, always below [`APPLICATION_CODE_LIMIT`].
    Application(i32),
}

impl ErrorCode {
    /// Application-defined code; `None` unless `code < -100`.
    #[must_use]
    pub fn application(code: i32) -> Option<Self> {
        (code < APPLICATION_CODE_LIMIT).then_some(Self::Application(code))
    }

    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Decoding => -1,
            Self::Validation => -2,
            Self::Processing => -3,
            Self::Timeout => -4,
            Self::EmptyPayload => -5,
            Self::Application(code) => code,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            -1 => Ok(Self::Decoding),
            -2 => Ok(Self::Validation),
            -3 => Ok(Self::Processing),
            -4 => Ok(Self::Timeout),
            -5 => Ok(Self::EmptyPayload),
            code if code < APPLICATION_CODE_LIMIT => Ok(Self::Application(code)),
            code => Err(format!("unknown error code {}", code)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Decoding => f.write_str("decoding"),
            Self::Validation => f.write_str("validation"),
            Self::Processing => f.write_str("processing"),
            Self::Timeout => f.write_str("timeout"),
            Self::EmptyPayload => f.write_str("empty-payload"),
            Self::Application(code) => write!(f, "application({})", code),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Wire-visible error record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp_ms: u64,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp_ms: now_millis(),
        }
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decoding, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Processing, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn empty_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EmptyPayload, message)
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_integer_mapping() {
        for code in [
            ErrorCode::None,
            ErrorCode::Decoding,
            ErrorCode::Validation,
            ErrorCode::Processing,
            ErrorCode::Timeout,
            ErrorCode::EmptyPayload,
            ErrorCode::Application(-250),
        ] {
            assert_eq!(ErrorCode::try_from(code.as_i32()), Ok(code));
        }
        assert!(ErrorCode::try_from(-50).is_err());
        assert!(ErrorCode::try_from(3).is_err());
    }

    #[test]
    fn test_application_range() {
        assert_eq!(ErrorCode::application(-101), Some(ErrorCode::Application(-101)));
        assert_eq!(ErrorCode::application(-100), None);
        assert_eq!(ErrorCode::application(7), None);
    }

    #[test]
    fn test_error_payload_serializes_code_as_integer() {
        let payload = ErrorPayload::timeout("late");
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["code"], serde_json::json!(-4));
        assert_eq!(value["message"], serde_json::json!("late"));

        let bad = serde_json::json!({"code": -42, "message": "x", "timestamp_ms": 0});
        assert!(serde_json::from_value::<ErrorPayload>(bad).is_err());
    }

    #[test]
    fn test_display() {
        let err = LabmeshError::DuplicateHandler("lab/req/a/b/ping".into());
        assert!(err.to_string().contains("lab/req/a/b/ping"));
        assert_eq!(ErrorPayload::processing("boom").to_string(), "[processing] boom");
    }
}
