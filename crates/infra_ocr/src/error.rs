//! OCR adapter error types

use core_kernel::PortError;
use thiserror::Error;

/// Errors raised while running an engine or preparing its input
#[derive(Debug, Error)]
pub enum OcrAdapterError {
    /// The engine process could not be started
    #[error("Failed to start {engine}: {source}")]
    Spawn {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited with a failure status
    #[error("{engine} exited with status {code:?}: {stderr}")]
    Exit {
        engine: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The engine did not answer in time
    #[error("{engine} timed out after {timeout_ms}ms")]
    Timeout { engine: String, timeout_ms: u64 },

    /// The engine wrote something other than the expected JSON
    #[error("Invalid output from {engine}: {message}")]
    InvalidOutput { engine: String, message: String },

    /// The engine reported its own error
    #[error("{engine} reported: {message}")]
    Engine { engine: String, message: String },

    /// An evidence reference escapes the storage root
    #[error("Rejected evidence reference: {0}")]
    InvalidReference(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OcrAdapterError> for PortError {
    fn from(error: OcrAdapterError) -> Self {
        match error {
            OcrAdapterError::Spawn { engine, .. } => PortError::ServiceUnavailable { service: engine },
            OcrAdapterError::Timeout { engine, timeout_ms } => PortError::timeout(engine, timeout_ms),
            OcrAdapterError::InvalidOutput { .. } | OcrAdapterError::Image(_) => {
                PortError::decoding(error.to_string())
            }
            OcrAdapterError::InvalidReference(_) => PortError::validation(error.to_string()),
            _ => PortError::internal(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_transient_port_error() {
        let err: PortError = OcrAdapterError::Timeout {
            engine: "easyocr".to_string(),
            timeout_ms: 500,
        }
        .into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("easyocr"));
    }

    #[test]
    fn test_exit_status_keeps_stderr() {
        let err = OcrAdapterError::Exit {
            engine: "tesseract".to_string(),
            code: Some(2),
            stderr: "cannot read image".to_string(),
        };
        assert!(err.to_string().contains("cannot read image"));
        let port: PortError = err.into();
        assert!(!port.is_transient());
    }
}
