//! Image fingerprinting for duplicate detection
//!
//! The image is decoded, resized to a fixed 200x200 grid, converted to
//! grayscale and contrast-stretched before hashing, so the same picture
//! re-encoded or uploaded at a different size hashes identically.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const GRID: u32 = 200;

/// Hex-encoded SHA-256 of a normalized image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a fingerprint previously computed and stored
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Computes the fingerprint of an encoded image
pub fn fingerprint(bytes: &[u8]) -> Result<Fingerprint, FingerprintError> {
    let image = image::load_from_memory(bytes)?;
    let mut luma = image
        .resize_exact(GRID, GRID, FilterType::Triangle)
        .to_luma8();

    stretch_contrast(&mut luma);

    let hash = format!("{:x}", Sha256::digest(luma.as_raw()));
    Ok(Fingerprint(hash))
}

/// Maps the darkest pixel to 0 and the brightest to 255
///
/// Integer arithmetic only, so a stored fingerprint stays reproducible.
/// OCR normalization runs the same stretch.
pub fn stretch_contrast(pixels: &mut [u8]) {
    let (Some(&min), Some(&max)) = (pixels.iter().min(), pixels.iter().max()) else {
        return;
    };
    if max == min {
        return;
    }
    let span = (max - min) as u32;
    for p in pixels.iter_mut() {
        *p = (((*p - min) as u32 * 255 + span / 2) / span) as u8;
    }
}
