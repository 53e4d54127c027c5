//! OCR engines run as external processes
//!
//! The engine receives the path of a temporary image file as its last
//! argument and prints a single JSON object on stdout:
//!
//! ```text
//! {"text": "...", "confidence": 0.87}
//! {"error": "model not loaded"}
//! ```
//!
//! Tesseract, EasyOCR and PaddleOCR wrappers all follow this contract, so a
//! tier is just a program path plus arguments.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use core_kernel::{DomainPort, PortError};
use domain_verification::{OcrProvider, Recognition};

use crate::error::OcrAdapterError;

/// How to invoke one engine
#[derive(Debug, Clone)]
pub struct CommandOcrConfig {
    /// Name reported to the pipeline and used in audit event names
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandOcrConfig {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct EngineOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// An `OcrProvider` backed by an external engine process
#[derive(Debug, Clone)]
pub struct CommandOcrProvider {
    config: CommandOcrConfig,
}

impl CommandOcrProvider {
    pub fn new(config: CommandOcrConfig) -> Self {
        Self { config }
    }

    async fn run(&self, image: &[u8]) -> Result<Recognition, OcrAdapterError> {
        let engine = &self.config.name;

        // Kept alive until the process has exited
        let mut file = tempfile::Builder::new()
            .prefix("receipt-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrAdapterError::Spawn {
                engine: engine.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| OcrAdapterError::Timeout {
                engine: engine.clone(),
                timeout_ms: self.config.timeout.as_millis() as u64,
            })??;

        if !output.status.success() {
            return Err(OcrAdapterError::Exit {
                engine: engine.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_output(engine, &output.stdout)
    }
}

fn parse_output(engine: &str, stdout: &[u8]) -> Result<Recognition, OcrAdapterError> {
    let raw = String::from_utf8_lossy(stdout);
    let parsed: EngineOutput =
        serde_json::from_str(raw.trim()).map_err(|e| OcrAdapterError::InvalidOutput {
            engine: engine.to_string(),
            message: e.to_string(),
        })?;

    if let Some(message) = parsed.error {
        return Err(OcrAdapterError::Engine {
            engine: engine.to_string(),
            message,
        });
    }

    match parsed.text {
        Some(text) if !text.trim().is_empty() => {
            Ok(Recognition::new(text, parsed.confidence.unwrap_or(0.0)))
        }
        _ => Ok(Recognition::empty()),
    }
}

impl DomainPort for CommandOcrProvider {}

#[async_trait]
impl OcrProvider for CommandOcrProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip(self, image), fields(engine = %self.config.name, bytes = image.len()))]
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, PortError> {
        match self.run(image).await {
            Ok(recognition) => {
                debug!(
                    confidence = recognition.confidence,
                    chars = recognition.text.len(),
                    "Engine finished"
                );
                Ok(recognition)
            }
            Err(e) => {
                warn!(error = %e, "Engine failed");
                Err(e.into())
            }
        }
    }
}
