use facecheck_core::DetectorOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration: defaults, then an optional TOML file, then
/// `FACECHECK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path for the capture slot.
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Frames discarded before a still is taken (auto-exposure settling).
    pub warmup_frames: usize,
    /// JPEG quality of captured stills.
    pub jpeg_quality: u8,
    /// SCRFD input side; multiple of 32.
    pub detector_input_size: u32,
    /// Minimum SCRFD face score.
    pub score_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let detector = DetectorOptions::default();
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: facecheck_core::default_model_dir(),
            warmup_frames: 4,
            jpeg_quality: 90,
            detector_input_size: detector.input_size,
            score_threshold: detector.score_threshold,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and `FACECHECK_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("FACECHECK_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Ok(device) = std::env::var("FACECHECK_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        self.warmup_frames = env_or("FACECHECK_WARMUP_FRAMES", self.warmup_frames);
        self.jpeg_quality = env_or("FACECHECK_JPEG_QUALITY", self.jpeg_quality);
        self.detector_input_size = env_or("FACECHECK_DETECTOR_INPUT_SIZE", self.detector_input_size);
        self.score_threshold = env_or("FACECHECK_SCORE_THRESHOLD", self.score_threshold);
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            input_size: self.detector_input_size,
            score_threshold: self.score_threshold,
            ..DetectorOptions::default()
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the 128-d face recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join("dlib_face_recognition_resnet_model_v1.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_detector_options() {
        let config = Config::default();
        assert_eq!(config.detector_options(), DetectorOptions::default());
        assert_eq!(config.camera_device, "/dev/video0");
        assert!(config.model_dir.ends_with("facecheck/models"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            camera_device = "/dev/video2"
            model_dir = "/opt/models"
            detector_input_size = 320
            "#,
        )
        .unwrap();
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.detector_options().input_size, 320);
        assert_eq!(config.warmup_frames, 4);
        assert_eq!(config.scrfd_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(
            config.recognizer_model_path(),
            "/opt/models/dlib_face_recognition_resnet_model_v1.onnx"
        );
    }

    #[test]
    fn test_match_threshold_is_not_configurable() {
        let err = Config::from_toml("match_threshold = 0.9").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/facecheck.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
