//! Image sources and decoding.
//!
//! An [`ImageHandle`] is an opaque reference to still-image bytes, either a
//! file chosen by the user or an encoded camera capture. Decoding a handle
//! into pixels happens off the event loop via [`decode_async`].

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Opaque reference to the bytes of one still image. Cheap to clone.
#[derive(Debug, Clone)]
pub enum ImageHandle {
    /// An image file on disk.
    File(PathBuf),
    /// An in-memory encoded image (e.g., a JPEG produced by the camera).
    Encoded(Arc<[u8]>),
}

impl ImageHandle {
    pub fn encoded(bytes: Vec<u8>) -> Self {
        ImageHandle::Encoded(bytes.into())
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has no pixels")]
    Empty,
    #[error("decode task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("no file selected")]
    NoFileSelected,
    #[error("image file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("camera capture failed: {0}")]
    Camera(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Decode a handle into RGB pixels, blocking the calling thread.
pub fn decode(handle: &ImageHandle) -> Result<RgbImage, DecodeError> {
    let image = match handle {
        ImageHandle::File(path) => image::open(path)?,
        ImageHandle::Encoded(bytes) => image::load_from_memory(bytes)?,
    };
    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(rgb)
}

/// Decode a handle on the blocking thread pool.
pub async fn decode_async(handle: ImageHandle) -> Result<Arc<RgbImage>, DecodeError> {
    tokio::task::spawn_blocking(move || decode(&handle).map(Arc::new))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
}

/// Turn a user-selected path into an upload handle.
pub fn acquire_from_file(path: &Path) -> Result<ImageHandle, AcquisitionError> {
    if path.as_os_str().is_empty() {
        return Err(AcquisitionError::NoFileSelected);
    }
    if !path.is_file() {
        return Err(AcquisitionError::NotFound(path.to_path_buf()));
    }
    Ok(ImageHandle::File(path.to_path_buf()))
}

/// On-demand still capture, the source of the capture slot.
pub trait CaptureSource: Send + Sync {
    fn acquire(&self) -> Result<ImageHandle, AcquisitionError>;
}

/// Capture source that hands back the same image file on every capture.
///
/// Stands in for a camera on machines without one.
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureSource for FileCapture {
    fn acquire(&self) -> Result<ImageHandle, AcquisitionError> {
        acquire_from_file(&self.path)
    }
}
