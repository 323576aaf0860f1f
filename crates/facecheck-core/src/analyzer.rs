//! Face-analysis capability.
//!
//! [`FaceAnalyzer`] is the asynchronous seam the comparator talks to.
//! [`FacePipeline`] is the blocking SCRFD + ResNet descriptor implementation
//! that sits behind it: best face → landmarks → descriptor.

use crate::detector::{DetectorError, DetectorOptions, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Descriptor, FaceDetection};
use image::RgbImage;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face analysis unavailable: {0}")]
    Unavailable(String),
}

/// Finds the single most confident face in an image and describes it.
///
/// `Ok(None)` means the image was analysed and contains no face. `Err` means
/// the analysis itself could not run.
pub trait FaceAnalyzer: Send + Sync + 'static {
    fn detect_face(
        &self,
        image: Arc<RgbImage>,
    ) -> impl Future<Output = Result<Option<FaceDetection>, AnalysisError>> + Send;
}

/// Detector and recognizer loaded together.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    /// Load both ONNX models. Fails if either model file is missing.
    pub fn load(
        scrfd_path: &str,
        recognizer_path: &str,
        options: DetectorOptions,
    ) -> Result<Self, AnalysisError> {
        let detector = FaceDetector::load(scrfd_path, options)?;
        tracing::info!(path = scrfd_path, input_size = options.input_size, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(recognizer_path)?;
        tracing::info!(path = recognizer_path, "face recognizer loaded");

        Ok(Self {
            detector,
            recognizer,
        })
    }

    pub fn analyze(&mut self, image: &RgbImage) -> Result<Option<FaceDetection>, AnalysisError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.into_iter().next() else {
            tracing::debug!(
                width = image.width(),
                height = image.height(),
                "no face detected"
            );
            return Ok(None);
        };

        let described = self.recognizer.extract(image, &face);
        into_detection(face, described)
    }
}

/// A face that cannot be aligned counts as no face, not as a failure.
fn into_detection(
    face: BoundingBox,
    described: Result<Descriptor, RecognizerError>,
) -> Result<Option<FaceDetection>, AnalysisError> {
    match described {
        Ok(descriptor) => {
            tracing::debug!(confidence = face.confidence, "face described");
            Ok(Some(FaceDetection {
                bbox: face,
                descriptor,
            }))
        }
        Err(RecognizerError::NoLandmarks) => {
            tracing::debug!(confidence = face.confidence, "face without landmarks skipped");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(landmarks: Option<[(f32, f32); 5]>) -> BoundingBox {
        BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 40.0,
            height: 40.0,
            confidence: 0.8,
            landmarks,
        }
    }

    #[test]
    fn test_face_without_landmarks_is_undetected() {
        let result = into_detection(face(None), Err(RecognizerError::NoLandmarks)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_described_face() {
        let descriptor = Descriptor::new(vec![0.1; 4]);
        let result = into_detection(face(Some([(0.0, 0.0); 5])), Ok(descriptor.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(result.descriptor, descriptor);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let err = into_detection(
            face(Some([(0.0, 0.0); 5])),
            Err(RecognizerError::InferenceFailed("bad output".into())),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Recognizer(_)));
    }
}
