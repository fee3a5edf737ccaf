//! # Image Collaborators
//!
//! Traits for plugging image preprocessing and feature extraction into the
//! search engine. Ridgeline only needs their outputs: a preprocessed image
//! and a fixed-length feature vector in the same space as the indexed
//! matrix.
//!
//! ## Production Options
//!
//! 1. **In-process** (via an image crate + hand-written descriptors):
//!    - grayscale, histogram equalization, denoising
//!    - LBP, HOG and Gabor descriptors concatenated into one vector
//!
//! 2. **Sidecar service**:
//!    - the extraction step that produced the indexed `.npy` matrix, called
//!      per request

use async_trait::async_trait;

use ridgeline_core::error::{Error, Result};
use ridgeline_core::FeatureVector;

/// Grayscale image, row-major, one byte per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if (width as usize) * (height as usize) != pixels.len() {
            return Err(Error::Extraction {
                message: format!(
                    "{}x{} image needs {} pixels, got {}",
                    width,
                    height,
                    (width as usize) * (height as usize),
                    pixels.len()
                ),
            });
        }
        Ok(Self { width, height, pixels })
    }
}

/// Turns uploaded image bytes into the image the extractor expects
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn preprocess(&self, raw: &[u8]) -> Result<GrayImage>;
}

/// Turns a preprocessed image into a feature vector
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, image: &GrayImage) -> Result<FeatureVector>;

    /// Length of every vector this extractor produces
    fn dimension(&self) -> usize;
}

/// Treats the upload as already-decoded grayscale pixels, one row
pub struct RawPixelPreprocessor;

#[async_trait]
impl Preprocessor for RawPixelPreprocessor {
    async fn preprocess(&self, raw: &[u8]) -> Result<GrayImage> {
        if raw.is_empty() {
            return Err(Error::Extraction {
                message: "empty image".to_string(),
            });
        }
        GrayImage::new(raw.len() as u32, 1, raw.to_vec())
    }
}

/// Stand-in when no extractor is deployed; every call fails
pub struct UnconfiguredExtractor;

#[async_trait]
impl FeatureExtractor for UnconfiguredExtractor {
    async fn extract(&self, _image: &GrayImage) -> Result<FeatureVector> {
        Err(Error::Configuration {
            message: "no feature extractor is configured; search by vector instead".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// Pixel-intensity histogram with `bins` buckets, normalized to sum to 1.
///
/// Cheap and deterministic: byte-identical images give identical vectors.
pub struct HistogramExtractor {
    bins: usize,
}

impl HistogramExtractor {
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.clamp(1, 256) }
    }
}

#[async_trait]
impl FeatureExtractor for HistogramExtractor {
    async fn extract(&self, image: &GrayImage) -> Result<FeatureVector> {
        if image.pixels.is_empty() {
            return Err(Error::Extraction {
                message: "image has no pixels".to_string(),
            });
        }
        let mut histogram = vec![0f64; self.bins];
        for &p in &image.pixels {
            histogram[p as usize * self.bins / 256] += 1.0;
        }
        let total = image.pixels.len() as f64;
        for h in histogram.iter_mut() {
            *h /= total;
        }
        Ok(histogram)
    }

    fn dimension(&self) -> usize {
        self.bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_histogram_extractor() {
        let image = RawPixelPreprocessor.preprocess(&[0, 0, 255, 128]).await.unwrap();
        let extractor = HistogramExtractor::new(4);
        let v = extractor.extract(&image).await.unwrap();
        assert_eq!(v, vec![0.5, 0.0, 0.25, 0.25]);
        assert_eq!(extractor.dimension(), 4);
    }

    #[tokio::test]
    async fn test_unconfigured_extractor_fails() {
        let image = GrayImage::new(1, 1, vec![7]).unwrap();
        assert!(matches!(
            UnconfiguredExtractor.extract(&image).await,
            Err(Error::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        assert!(matches!(
            RawPixelPreprocessor.preprocess(&[]).await,
            Err(Error::Extraction { .. })
        ));
    }
}
