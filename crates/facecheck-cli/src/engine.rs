use facecheck_core::{AnalysisError, DetectorOptions, FaceAnalyzer, FaceDetection, FacePipeline};
use image::RgbImage;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model loading failed: {0}")]
    Models(#[from] AnalysisError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from the session to the engine thread.
enum EngineRequest {
    Analyze {
        image: Arc<RgbImage>,
        reply: oneshot::Sender<Result<Option<FaceDetection>, AnalysisError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl FaceAnalyzer for EngineHandle {
    fn detect_face(
        &self,
        image: Arc<RgbImage>,
    ) -> impl Future<Output = Result<Option<FaceDetection>, AnalysisError>> + Send {
        let tx = self.tx.clone();
        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AnalysisError::Unavailable("engine thread exited".into()))?;
            reply_rx
                .await
                .map_err(|_| AnalysisError::Unavailable("engine dropped the request".into()))?
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both ONNX models before returning so that a missing model fails the
/// command up front rather than the first comparison.
pub fn spawn_engine(
    scrfd_path: &str,
    recognizer_path: &str,
    options: DetectorOptions,
) -> Result<EngineHandle, EngineError> {
    let mut pipeline = FacePipeline::load(scrfd_path, recognizer_path, options)?;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facecheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = pipeline.analyze(&image);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "face analysis failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
