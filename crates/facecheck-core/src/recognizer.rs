//! Face recognizer via ONNX Runtime.
//!
//! Runs the dlib ResNet-34 metric network (the model behind face-api's
//! `faceRecognitionNet`) on a 150×150 aligned RGB chip and returns its raw
//! 128-dimensional descriptor. The network was trained so that descriptors
//! of the same person lie within Euclidean distance 0.6 of each other, which
//! is what [`MATCH_THRESHOLD`](crate::types::MATCH_THRESHOLD) assumes.

use crate::alignment;
use crate::types::{BoundingBox, Descriptor};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const CHIP_SIZE: u32 = 150;
/// Per-channel RGB mean the network was trained with.
const CHANNEL_MEAN: [f32; 3] = [122.782, 117.001, 104.298];
const CHANNEL_SCALE: f32 = 256.0;
pub const DESCRIPTOR_DIM: usize = 128;
pub const MODEL_VERSION: &str = "dlib_face_recognition_resnet_model_v1";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (export dlib_face_recognition_resnet_model_v1 to ONNX and place it in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; the detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the recognition network from an ONNX file.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "recognition model loaded"
        );

        Ok(Self { session })
    }

    /// Describe a detected face. The face must carry landmarks.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Descriptor, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let chip = alignment::align_face(image, landmarks, CHIP_SIZE);
        let input = preprocess(&chip);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        to_descriptor(raw)
    }
}

/// Raw network output is used as-is: the 0.6 distance scale only holds for
/// unnormalised descriptors.
fn to_descriptor(raw: &[f32]) -> Result<Descriptor, RecognizerError> {
    if raw.len() != DESCRIPTOR_DIM {
        return Err(RecognizerError::InferenceFailed(format!(
            "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
            raw.len()
        )));
    }
    Ok(Descriptor {
        values: raw.to_vec(),
        model_version: Some(MODEL_VERSION.to_string()),
    })
}

/// Aligned RGB chip → mean-subtracted NCHW float tensor.
fn preprocess(chip: &RgbImage) -> Array4<f32> {
    let (w, h) = chip.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in chip.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - CHANNEL_MEAN[c]) / CHANNEL_SCALE;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_channels() {
        let chip = RgbImage::from_pixel(CHIP_SIZE, CHIP_SIZE, Rgb([255, 117, 0]));
        let tensor = preprocess(&chip);
        assert_eq!(tensor.shape(), &[1, 3, 150, 150]);
        assert!((tensor[[0, 0, 5, 7]] - (255.0 - 122.782) / 256.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 5, 7]] - (117.0 - 117.001) / 256.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 5, 7]] + 104.298 / 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_descriptor_keeps_raw_scale() {
        let raw: Vec<f32> = (0..DESCRIPTOR_DIM).map(|i| 0.01 * (i % 7) as f32).collect();
        let descriptor = to_descriptor(&raw).unwrap();
        assert_eq!(descriptor.values, raw);
        assert_eq!(descriptor.model_version.as_deref(), Some(MODEL_VERSION));
    }

    #[test]
    fn test_descriptor_rejects_wrong_dimension() {
        let err = to_descriptor(&[0.1; 512]).unwrap_err();
        assert!(matches!(err, RecognizerError::InferenceFailed(_)));
    }

    #[test]
    fn test_missing_model() {
        let err = FaceRecognizer::load("/nonexistent/recognizer.onnx").err().unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
