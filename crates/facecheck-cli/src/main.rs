use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecheck_core::handle::{acquire_from_file, decode};
use facecheck_core::{CaptureSource, FaceAnalyzer, FileCapture};
use facecheck_hw::{Camera, StillCapture};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod session;

use config::Config;
use engine::{spawn_engine, EngineHandle};
use session::Session;

#[derive(Parser)]
#[command(name = "facecheck", about = "Compare an uploaded photo against a camera capture")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// V4L2 camera device (overrides configuration)
    #[arg(long, global = true)]
    device: Option<String>,
    /// Directory containing det_10g.onnx and dlib_face_recognition_resnet_model_v1.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare an uploaded image against a single capture
    Compare {
        /// Reference image
        #[arg(short, long)]
        upload: PathBuf,
        /// Use an image file instead of the camera for the capture
        #[arg(long)]
        capture_file: Option<PathBuf>,
        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session: upload and capture any number of times
    Session {
        /// Use an image file instead of the camera for captures
        #[arg(long)]
        capture_file: Option<PathBuf>,
    },
    /// Detect and describe the face in a single image
    Detect {
        path: PathBuf,
        /// Print the detection as JSON
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Compare {
            upload,
            capture_file,
            json,
        } => {
            let engine = start_engine(&config)?;
            let camera = open_capture(&config, capture_file)?;
            let verdict = Session::new(engine, camera).compare_once(&upload).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!("{}", verdict.result);
            }
        }
        Commands::Session { capture_file } => {
            let engine = start_engine(&config)?;
            let camera = open_capture(&config, capture_file)?;
            println!("commands: upload <path> | capture | status | quit");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            Session::new(engine, camera)
                .run_interactive(stdin, &mut std::io::stdout())
                .await?;
        }
        Commands::Detect { path, json } => {
            let engine = start_engine(&config)?;
            let image = decode(&acquire_from_file(&path)?)
                .with_context(|| format!("failed to decode {}", path.display()))?;
            let face = engine.detect_face(Arc::new(image)).await?;
            if json {
                let report = serde_json::json!({
                    "path": path,
                    "face": face,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match face {
                    Some(face) => println!(
                        "face detected: confidence {:.2}, box ({:.0}, {:.0}) {:.0}x{:.0}, {}-dim descriptor",
                        face.bbox.confidence,
                        face.bbox.x,
                        face.bbox.y,
                        face.bbox.width,
                        face.bbox.height,
                        face.descriptor.values.len()
                    ),
                    None => println!("no face detected"),
                }
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no V4L2 capture devices found");
            }
            for device in devices {
                println!(
                    "{}  {} (driver: {}, bus: {})",
                    device.path, device.name, device.driver, device.bus
                );
            }
        }
    }

    Ok(())
}

fn start_engine(config: &Config) -> Result<Arc<EngineHandle>> {
    let engine = spawn_engine(
        &config.scrfd_model_path(),
        &config.recognizer_model_path(),
        config.detector_options(),
    )
    .with_context(|| format!("failed to start engine (models in {})", config.model_dir.display()))?;
    Ok(Arc::new(engine))
}

fn open_capture(config: &Config, capture_file: Option<PathBuf>) -> Result<Arc<dyn CaptureSource>> {
    Ok(match capture_file {
        Some(path) => Arc::new(FileCapture::new(path)),
        None => Arc::new(
            StillCapture::open(&config.camera_device, config.warmup_frames, config.jpeg_quality)
                .with_context(|| format!("failed to open camera {}", config.camera_device))?,
        ),
    })
}
