//! OCR Infrastructure Layer
//!
//! Adapters behind the verification ports that touch the outside world:
//!
//! - [`CommandOcrProvider`] runs an OCR engine as a subprocess
//! - [`ImageNormalizer`] prepares evidence images for recognition
//! - [`FsEvidenceSource`] reads uploaded evidence from disk
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_ocr::{CommandOcrConfig, CommandOcrProvider};
//!
//! let tesseract = CommandOcrProvider::new(
//!     CommandOcrConfig::new("tesseract", "/opt/ocr/tesseract.sh")
//!         .timeout(Duration::from_secs(30)),
//! );
//! ```

pub mod command;
pub mod evidence;
pub mod preprocess;
pub mod error;

pub use command::{CommandOcrConfig, CommandOcrProvider};
pub use evidence::FsEvidenceSource;
pub use preprocess::{ImageNormalizer, NormalizerSettings};
pub use error::OcrAdapterError;
