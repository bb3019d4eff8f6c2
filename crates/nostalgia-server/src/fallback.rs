//! The local fallback tier: landmark detection plus the geometric smile warp.
//!
//! [`LocalFallback::local_smile`] never fails. Anything that goes wrong
//! degrades to the original image re-encoded as JPEG.

use std::sync::Arc;

use nostalgia_warp::{codec, warp_smile, LandmarkSet, SmileWarpParams};
use tracing::{info, warn};

use crate::detector::LandmarkDetector;
use crate::upload::SourceImage;

/// Output of the local tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSmile {
    /// JPEG bytes.
    pub bytes: Vec<u8>,
    /// `true` if a face was found and warped, `false` for a passthrough.
    pub found_face: bool,
}

/// Detector plus warp, with JPEG output.
#[derive(Clone)]
pub struct LocalFallback {
    detector: Arc<dyn LandmarkDetector>,
    params: SmileWarpParams,
    jpeg_quality: u8,
}

impl std::fmt::Debug for LocalFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFallback")
            .field("params", &self.params)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish_non_exhaustive()
    }
}

impl LocalFallback {
    /// Creates a fallback tier with JPEG quality 95.
    #[must_use]
    pub fn new(detector: Arc<dyn LandmarkDetector>, params: SmileWarpParams) -> Self {
        Self {
            detector,
            params,
            jpeg_quality: codec::JPEG_QUALITY,
        }
    }

    /// Sets the JPEG quality of produced images.
    #[must_use]
    pub const fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Smiles the face in `image`, or passes the image through.
    pub async fn local_smile(&self, image: &SourceImage) -> LocalSmile {
        let landmarks = match self.detector.detect(image).await {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                info!("No face detected, passing image through");
                return self.passthrough(image).await;
            }
            Err(e) => {
                warn!(error = %e, "Landmark detection failed, passing image through");
                return self.passthrough(image).await;
            }
        };

        match self.warp(image, landmarks).await {
            Some(bytes) => {
                info!(size = bytes.len(), "Local smile produced");
                LocalSmile {
                    bytes,
                    found_face: true,
                }
            }
            None => self.passthrough(image).await,
        }
    }

    async fn warp(&self, image: &SourceImage, landmarks: LandmarkSet) -> Option<Vec<u8>> {
        let pixels = image.shared_pixels();
        let params = self.params;
        let quality = self.jpeg_quality;

        let joined = tokio::task::spawn_blocking(move || {
            let warped = warp_smile(&pixels, &landmarks, &params)?;
            codec::encode_jpeg(&warped, quality)
        })
        .await;

        match joined {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(e)) => {
                warn!(error = %e, "Smile warp failed, passing image through");
                None
            }
            Err(e) => {
                warn!(error = %e, "Smile warp worker did not finish, passing image through");
                None
            }
        }
    }

    async fn passthrough(&self, image: &SourceImage) -> LocalSmile {
        let pixels = image.shared_pixels();
        let quality = self.jpeg_quality;
        let encoded =
            tokio::task::spawn_blocking(move || codec::encode_jpeg(&pixels, quality)).await;

        let bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(error = %e, "Re-encoding failed, returning upload bytes");
                image.encoded().bytes.clone()
            }
            Err(e) => {
                warn!(error = %e, "Re-encoding worker did not finish, returning upload bytes");
                image.encoded().bytes.clone()
            }
        };
        LocalSmile {
            bytes,
            found_face: false,
        }
    }
}
