//! Image normalization ahead of recognition
//!
//! Screenshots of ride-hailing apps are small and often print amounts in
//! colored text. Engines read them noticeably better after upscaling to a
//! minimum width, boosting contrast, converting to grayscale and sharpening.
//! The output is always PNG.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, PortError};
use domain_verification::{stretch_contrast, ImagePreprocessor};

use crate::error::OcrAdapterError;

/// Tuning of the normalization steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizerSettings {
    /// Narrower images are upscaled to this width
    pub min_width: u32,
    /// Linear contrast gain around mid-gray
    pub contrast: f32,
    pub sharpen_sigma: f32,
    pub sharpen_threshold: i32,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            min_width: 1200,
            contrast: 1.2,
            sharpen_sigma: 1.5,
            sharpen_threshold: 1,
        }
    }
}

/// `ImagePreprocessor` built on the `image` crate
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    settings: NormalizerSettings,
}

impl ImageNormalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    /// Runs every step synchronously
    pub fn normalize_blocking(&self, bytes: &[u8]) -> Result<Vec<u8>, OcrAdapterError> {
        let source = image::load_from_memory(bytes)?;
        let upscaled = upscale(source, self.settings.min_width);

        let mut gray = upscaled.to_luma8();
        stretch_contrast(&mut gray);
        apply_contrast(&mut gray, self.settings.contrast);
        stretch_contrast(&mut gray);
        let sharpened = imageops::unsharpen(
            &gray,
            self.settings.sharpen_sigma,
            self.settings.sharpen_threshold,
        );

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(sharpened).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }
}

fn upscale(image: DynamicImage, min_width: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width == 0 || width >= min_width {
        return image;
    }
    let scaled_height = ((height as f64) * (min_width as f64) / (width as f64)).round() as u32;
    debug!(width, height, min_width, scaled_height, "Upscaling evidence image");
    image.resize_exact(min_width, scaled_height.max(1), FilterType::Lanczos3)
}

fn apply_contrast(image: &mut GrayImage, gain: f32) {
    let offset = 128.0 * (gain - 1.0);
    let pixels: &mut [u8] = &mut **image;
    for p in pixels.iter_mut() {
        *p = ((*p as f32) * gain - offset).clamp(0.0, 255.0) as u8;
    }
}

impl DomainPort for ImageNormalizer {}

#[async_trait]
impl ImagePreprocessor for ImageNormalizer {
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn normalize(&self, image: &[u8]) -> Result<Vec<u8>, PortError> {
        let normalizer = self.clone();
        let bytes = image.to_vec();
        tokio::task::spawn_blocking(move || normalizer.normalize_blocking(&bytes))
            .await
            .map_err(|e| PortError::internal(format!("Normalization task failed: {}", e)))?
            .map_err(PortError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = ((x + y) % 200) as u8 + 20;
            Rgb([v, v / 3, 255 - v])
        }));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_small_images_are_upscaled_keeping_aspect() {
        let out = ImageNormalizer::default().normalize_blocking(&png(300, 600)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.width(), 1200);
        assert_eq!(decoded.height(), 2400);
    }

    #[test]
    fn test_wide_images_keep_their_size() {
        let out = ImageNormalizer::default().normalize_blocking(&png(1300, 100)).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1300, 100));
    }

    #[test]
    fn test_output_is_grayscale_png() {
        let out = ImageNormalizer::default().normalize_blocking(&png(50, 50)).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&out).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_stretch_spans_full_range() {
        let mut gray = GrayImage::from_fn(4, 1, |x, _| image::Luma([100 + x as u8 * 10]));
        stretch_contrast(&mut gray);
        assert_eq!(gray.as_raw(), &vec![0, 85, 170, 255]);
    }

    #[test]
    fn test_contrast_saturates() {
        let mut gray = GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 5 } else { 250 }]));
        apply_contrast(&mut gray, 1.2);
        assert_eq!(gray.as_raw(), &vec![0, 255]);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_a_decoding_error() {
        let err = ImageNormalizer::default().normalize(b"not an image").await.unwrap_err();
        assert!(matches!(err, PortError::Decoding { .. }));
    }
}
