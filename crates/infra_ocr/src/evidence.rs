//! Evidence stored on the local filesystem

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

use core_kernel::{DomainPort, PortError};
use domain_verification::EvidenceSource;

use crate::error::OcrAdapterError;

/// Resolves evidence references as paths relative to an upload root
#[derive(Debug, Clone)]
pub struct FsEvidenceSource {
    root: PathBuf,
}

impl FsEvidenceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a reference onto the root, refusing anything that could escape it
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, OcrAdapterError> {
        let relative = Path::new(reference.trim());
        let safe = !reference.trim().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(OcrAdapterError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl DomainPort for FsEvidenceSource {}

#[async_trait]
impl EvidenceSource for FsEvidenceSource {
    #[instrument(skip(self))]
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PortError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Loaded evidence");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PortError::not_found("Evidence", reference))
            }
            Err(e) => Err(OcrAdapterError::Io(e).into()),
        }
    }
}
