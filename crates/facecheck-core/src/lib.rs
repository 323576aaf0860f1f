//! facecheck-core — Compare an uploaded photo against a camera capture.
//!
//! The [`Comparator`] waits until both images are decoded, then runs face
//! analysis on each (SCRFD detection + dlib ResNet descriptor via ONNX Runtime)
//! and classifies the Euclidean distance between the two descriptors.

pub mod alignment;
pub mod analyzer;
pub mod comparator;
pub mod detector;
pub mod gate;
pub mod handle;
pub mod recognizer;
pub mod types;

pub use analyzer::{AnalysisError, FaceAnalyzer, FacePipeline};
pub use comparator::{compare_faces, Comparator, ComparisonTask, Verdict};
pub use detector::DetectorOptions;
pub use gate::{DecodeTicket, PairId, ReadinessGate};
pub use handle::{AcquisitionError, CaptureSource, DecodeError, FileCapture, ImageHandle};
pub use types::{BoundingBox, ComparisonResult, Descriptor, FaceDetection, Slot, MATCH_THRESHOLD};

use std::path::PathBuf;

/// Default location of the ONNX model files: `$XDG_DATA_HOME/facecheck/models`,
/// falling back to `~/.local/share/facecheck/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecheck")
        .join("models")
}
