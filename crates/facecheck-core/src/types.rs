use serde::{Deserialize, Serialize};
use std::fmt;

/// Euclidean distance below which two descriptors are considered the same person.
///
/// Strict comparison: a distance of exactly `MATCH_THRESHOLD` is a non-match.
pub const MATCH_THRESHOLD: f32 = 0.6;

/// One of the two independent image acquisition channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Reference image supplied from a file.
    Upload,
    /// Probe image captured from the camera.
    Capture,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Upload => f.write_str("upload"),
            Slot::Capture => f.write_str("capture"),
        }
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face descriptor (128-dimensional for the dlib ResNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "dlib_face_recognition_resnet_model_v1").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// L2 norm of the difference between two descriptors. Lower = more similar.
    ///
    /// Both descriptors must come from the same model.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        debug_assert_eq!(
            self.values.len(),
            other.values.len(),
            "descriptor dimensions differ"
        );
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A single detected face together with its descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// Outcome of comparing the upload image against the capture image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComparisonResult {
    Match { distance: f32 },
    NoMatch { distance: f32 },
    /// No face was found in at least one of the two images.
    Undetected,
}

impl ComparisonResult {
    /// Classify a descriptor distance against [`MATCH_THRESHOLD`].
    pub fn classify(distance: f32) -> Self {
        if distance < MATCH_THRESHOLD {
            ComparisonResult::Match { distance }
        } else {
            ComparisonResult::NoMatch { distance }
        }
    }

    /// Build a result from the two single-face detections.
    ///
    /// A missing face on either side takes precedence over any distance.
    pub fn from_detections(upload: Option<&FaceDetection>, capture: Option<&FaceDetection>) -> Self {
        match (upload, capture) {
            (Some(a), Some(b)) => Self::classify(a.descriptor.euclidean_distance(&b.descriptor)),
            _ => ComparisonResult::Undetected,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, ComparisonResult::Match { .. })
    }

    /// Full-precision distance, if both faces were detected.
    pub fn distance(&self) -> Option<f32> {
        match *self {
            ComparisonResult::Match { distance } | ComparisonResult::NoMatch { distance } => {
                Some(distance)
            }
            ComparisonResult::Undetected => None,
        }
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonResult::Match { distance } => {
                write!(f, "✅ Match! (Distance: {distance:.2})")
            }
            ComparisonResult::NoMatch { distance } => {
                write!(f, "❌ No Match. (Distance: {distance:.2})")
            }
            ComparisonResult::Undetected => {
                f.write_str("⚠️ Unable to detect face in one or both images.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(values: Vec<f32>) -> FaceDetection {
        FaceDetection {
            bbox: BoundingBox {
                x: 0.0, y: 0.0, width: 10.0, height: 10.0,
                confidence: 0.9, landmarks: None,
            },
            descriptor: Descriptor::new(values),
        }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "descriptor dimensions differ")]
    fn test_distance_rejects_mismatched_dimensions() {
        let a = Descriptor::new(vec![0.0; 128]);
        let b = Descriptor::new(vec![0.0; 512]);
        a.euclidean_distance(&b);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert_eq!(
            ComparisonResult::classify(0.6),
            ComparisonResult::NoMatch { distance: 0.6 }
        );
        assert!(ComparisonResult::classify(0.599999).is_match());
        assert!(!ComparisonResult::classify(1.2).is_match());
    }

    #[test]
    fn test_undetected_precedence() {
        let face = detection(vec![0.1, 0.2]);
        assert_eq!(
            ComparisonResult::from_detections(Some(&face), None),
            ComparisonResult::Undetected
        );
        assert_eq!(
            ComparisonResult::from_detections(None, Some(&face)),
            ComparisonResult::Undetected
        );
        assert_eq!(ComparisonResult::from_detections(None, None), ComparisonResult::Undetected);
    }

    #[test]
    fn test_from_detections_keeps_full_precision() {
        let a = detection(vec![0.0, 0.0]);
        let b = detection(vec![0.3, 0.4]);
        let result = ComparisonResult::from_detections(Some(&a), Some(&b));
        assert!(result.is_match());
        let distance = result.distance().unwrap();
        assert!((distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(
            ComparisonResult::Match { distance: 0.45 }.to_string(),
            "✅ Match! (Distance: 0.45)"
        );
        assert_eq!(
            ComparisonResult::NoMatch { distance: 0.72 }.to_string(),
            "❌ No Match. (Distance: 0.72)"
        );
        assert_eq!(
            ComparisonResult::Undetected.to_string(),
            "⚠️ Unable to detect face in one or both images."
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(ComparisonResult::Undetected).unwrap();
        assert_eq!(json, serde_json::json!({ "outcome": "undetected" }));

        let json = serde_json::to_value(ComparisonResult::NoMatch { distance: 1.0 }).unwrap();
        assert_eq!(json["outcome"], "no_match");
        assert_eq!(json["distance"], 1.0);
    }
}
