// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::stream::{StreamOperation, StreamState};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid request: {operation} is not allowed in state {state}")]
    InvalidRequest {
        state: StreamState,
        operation: StreamOperation,
    },

    #[error("Object has been shut down")]
    Shutdown,

    #[error("Sample delivered without an outstanding request")]
    NoSampleRequested,

    #[error("No resource available: {0}")]
    ResourceExhausted(String),

    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported device capability: {0}")]
    UnsupportedDevice(String),

    #[error("Sample size {actual_width}x{actual_height} does not match media type {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Stream count is fixed")]
    FixedStreams,

    #[error("Invalid stream index or identifier: {0}")]
    InvalidStreamIndex(u32),

    #[error("GPU operation failed: {0}")]
    GpuError(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Failures from caller-supplied devices, clocks and processors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// Protocol errors are returned synchronously and never change state.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::Shutdown | Self::NoSampleRequested
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors() {
        assert!(StreamError::Shutdown.is_protocol_error());
        assert!(StreamError::NoSampleRequested.is_protocol_error());
        assert!(StreamError::InvalidRequest {
            state: StreamState::Stopped,
            operation: StreamOperation::Pause,
        }
        .is_protocol_error());
        assert!(!StreamError::Timeout("flush".into()).is_protocol_error());
    }

    #[test]
    fn test_foreign_errors_convert() {
        fn read_clock() -> Result<i64> {
            let raw: anyhow::Result<i64> = Err(anyhow::anyhow!("clock source unplugged"));
            Ok(raw?)
        }
        let err = read_clock().unwrap_err();
        assert!(matches!(err, StreamError::Other(_)));
        assert!(!err.is_protocol_error());
        assert_eq!(err.to_string(), "clock source unplugged");
    }
}
