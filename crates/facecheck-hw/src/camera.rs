//! V4L2 still capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use facecheck_core::{AcquisitionError, CaptureSource, ImageHandle};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

/// Frames tried after warm-up before settling for a dark one.
const MAX_DARK_RETRIES: usize = 10;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    NotFound(String),
    #[error("{device} cannot be opened: {source}")]
    Open {
        device: String,
        source: std::io::Error,
    },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("streaming failed: {0}")]
    Stream(std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A V4L2 capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the camera can be converted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUYV 4:2:2.
    Yuyv,
    /// 8-bit luma only.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

pub struct Camera {
    device: Device,
    path: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and negotiate 640x480 YUYV (or GREY, if that is
    /// what the driver insists on).
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }
        let device = Device::with_path(device_path).map_err(|source| CameraError::Open {
            device: device_path.to_string(),
            source,
        })?;

        let caps = device.query_caps().map_err(|source| CameraError::Open {
            device: device_path.to_string(),
            source,
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(device_path.to_string()));
        }

        let (width, height, pixel_format) = negotiate(&device)?;
        tracing::info!(
            device = device_path,
            card = %caps.card,
            width,
            height,
            format = ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            path: device_path.to_string(),
            width,
            height,
            pixel_format,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn read_frame(&self, stream: &mut MmapStream<'_>) -> Result<Frame, CameraError> {
        let (buf, meta) = stream.next().map_err(CameraError::Stream)?;
        let data = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)?,
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height)?,
        };
        Ok(Frame {
            is_dark: frame::is_dark_frame(&data, 0.95),
            data,
            width: self.width,
            height: self.height,
            sequence: meta.sequence,
        })
    }

    /// Take one still. The first `warmup` frames are thrown away while
    /// auto-exposure settles; after that, dark frames are skipped up to
    /// [`MAX_DARK_RETRIES`] times.
    pub fn capture_still(&self, warmup: usize) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::Stream)?;

        for _ in 0..warmup {
            self.read_frame(&mut stream)?;
        }

        let mut still = self.read_frame(&mut stream)?;
        for _ in 0..MAX_DARK_RETRIES {
            if !still.is_dark {
                return Ok(still);
            }
            tracing::debug!(seq = still.sequence, "dark frame skipped");
            still = self.read_frame(&mut stream)?;
        }
        if still.is_dark {
            tracing::warn!(device = %self.path, "no lit frame found; using a dark one");
        }
        Ok(still)
    }

    /// Enumerate `/dev/video0..15`, keeping devices that can capture video.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::Format(format!("cannot read format: {e}")))?;
    fmt.width = CAPTURE_WIDTH;
    fmt.height = CAPTURE_HEIGHT;
    fmt.fourcc = FourCC::new(b"YUYV");

    let fmt = device
        .set_format(&fmt)
        .map_err(|e| CameraError::Format(format!("cannot set format: {e}")))?;
    let pixel_format = PixelFormat::from_fourcc(fmt.fourcc).ok_or_else(|| {
        CameraError::Format(format!("driver chose {}, need YUYV or GREY", fmt.fourcc))
    })?;
    Ok((fmt.width, fmt.height, pixel_format))
}

/// Capture slot backed by a camera: each acquisition is one JPEG still.
pub struct StillCapture {
    camera: Camera,
    warmup_frames: usize,
    jpeg_quality: u8,
}

impl StillCapture {
    pub fn open(device_path: &str, warmup_frames: usize, jpeg_quality: u8) -> Result<Self, CameraError> {
        Ok(Self {
            camera: Camera::open(device_path)?,
            warmup_frames,
            jpeg_quality,
        })
    }

    fn capture_jpeg(&self) -> Result<Vec<u8>, CameraError> {
        let still = self.camera.capture_still(self.warmup_frames)?;
        let jpeg = still.encode_jpeg(self.jpeg_quality)?;
        tracing::debug!(
            device = %self.camera.path(),
            seq = still.sequence,
            bytes = jpeg.len(),
            "still captured"
        );
        Ok(jpeg)
    }
}

impl CaptureSource for StillCapture {
    fn acquire(&self) -> Result<ImageHandle, AcquisitionError> {
        self.capture_jpeg()
            .map(ImageHandle::encoded)
            .map_err(|e| AcquisitionError::Camera(Box::new(e)))
    }
}
