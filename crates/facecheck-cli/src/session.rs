//! Event-driven host for the comparator.
//!
//! The session loop is the only code that touches comparator state. File
//! uploads are acquired inline; camera captures, decodes and comparisons run
//! in the background and report back as [`HostEvent`]s on a channel drained
//! by the loop.

use anyhow::{bail, Result};
use facecheck_core::handle::{acquire_from_file, decode_async};
use facecheck_core::{
    AcquisitionError, AnalysisError, CaptureSource, Comparator, ComparisonTask, DecodeError,
    DecodeTicket, FaceAnalyzer, ImageHandle, Slot, Verdict,
};
use image::RgbImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// A line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    Capture,
    Status,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: upload <path>")]
    MissingPath,
    #[error("unknown command: {0} (expected upload, capture, status or quit)")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "upload" | "u" => {
                let path = rest.trim();
                if path.is_empty() {
                    return Err(CommandError::MissingPath);
                }
                Ok(Command::Upload(PathBuf::from(path)))
            }
            "capture" | "c" => Ok(Command::Capture),
            "status" | "s" => Ok(Command::Status),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Something the user should hear about.
#[derive(Debug)]
pub enum SessionUpdate {
    /// A comparison finished and its verdict is now the current one.
    Verdict(Verdict),
    /// A comparison finished after a newer pair had already been published.
    Superseded(Verdict),
    ComparisonFailed(AnalysisError),
    AcquisitionFailed { slot: Slot, error: AcquisitionError },
    DecodeFailed { slot: Slot, error: DecodeError },
}

enum HostEvent {
    Acquired {
        slot: Slot,
        result: Result<ImageHandle, AcquisitionError>,
    },
    Decoded {
        ticket: DecodeTicket,
        result: Result<Arc<RgbImage>, DecodeError>,
    },
    Finished(Result<Verdict, AnalysisError>),
}

pub struct Session<A> {
    comparator: Comparator<A>,
    camera: Arc<dyn CaptureSource>,
    events_tx: mpsc::UnboundedSender<HostEvent>,
    events_rx: mpsc::UnboundedReceiver<HostEvent>,
    /// Background jobs whose event has not been handled yet.
    pending: usize,
}

impl<A: FaceAnalyzer> Session<A> {
    pub fn new(analyzer: Arc<A>, camera: Arc<dyn CaptureSource>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            comparator: Comparator::new(analyzer),
            camera,
            events_tx,
            events_rx,
            pending: 0,
        }
    }

    pub fn comparator(&self) -> &Comparator<A> {
        &self.comparator
    }

    /// Select an upload file.
    pub fn upload(&mut self, path: &Path) -> Option<SessionUpdate> {
        self.on_acquired(Slot::Upload, acquire_from_file(path))
    }

    /// Take a still from the capture source in the background.
    pub fn capture(&mut self) {
        let camera = Arc::clone(&self.camera);
        let tx = self.events_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || camera.acquire())
                .await
                .unwrap_or_else(|e| Err(AcquisitionError::Camera(Box::new(e))));
            let _ = tx.send(HostEvent::Acquired {
                slot: Slot::Capture,
                result,
            });
        });
    }

    fn on_acquired(
        &mut self,
        slot: Slot,
        result: Result<ImageHandle, AcquisitionError>,
    ) -> Option<SessionUpdate> {
        match result {
            Ok(handle) => {
                let ticket = self.comparator.set_source(slot, handle);
                self.spawn_decode(ticket);
                None
            }
            Err(error) => {
                tracing::warn!(%slot, %error, "image acquisition failed");
                Some(SessionUpdate::AcquisitionFailed { slot, error })
            }
        }
    }

    fn spawn_decode(&mut self, ticket: DecodeTicket) {
        let tx = self.events_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = decode_async(ticket.handle.clone()).await;
            let _ = tx.send(HostEvent::Decoded { ticket, result });
        });
    }

    fn watch_comparison(&mut self, task: ComparisonTask) {
        let tx = self.events_tx.clone();
        self.pending += 1;
        tokio::spawn(async move {
            let result = task.await.unwrap_or_else(|e| {
                Err(AnalysisError::Unavailable(format!("comparison task failed: {e}")))
            });
            let _ = tx.send(HostEvent::Finished(result));
        });
    }

    fn handle_event(&mut self, event: HostEvent) -> Option<SessionUpdate> {
        self.pending = self.pending.saturating_sub(1);
        match event {
            HostEvent::Acquired { slot, result } => self.on_acquired(slot, result),
            HostEvent::Decoded { ticket, result } => match result {
                Ok(image) => {
                    if let Some(task) = self.comparator.on_decoded(&ticket, image) {
                        self.watch_comparison(task);
                    }
                    None
                }
                Err(error) => {
                    tracing::warn!(slot = %ticket.slot, %error, "image decode failed");
                    Some(SessionUpdate::DecodeFailed {
                        slot: ticket.slot,
                        error,
                    })
                }
            },
            HostEvent::Finished(Ok(verdict)) => {
                if self.comparator.latest().map(|v| v.pair) == Some(verdict.pair) {
                    Some(SessionUpdate::Verdict(verdict))
                } else {
                    Some(SessionUpdate::Superseded(verdict))
                }
            }
            HostEvent::Finished(Err(error)) => Some(SessionUpdate::ComparisonFailed(error)),
        }
    }

    /// Wait for the next update. Returns `None` once no background work is left.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        while self.pending > 0 {
            let event = self.events_rx.recv().await?;
            if let Some(update) = self.handle_event(event) {
                return Some(update);
            }
        }
        None
    }

    /// Readiness of both slots and the current verdict.
    pub fn status(&self) -> String {
        let gate = self.comparator.gate();
        let slot_state = |slot| {
            if gate.is_ready(slot) {
                "ready"
            } else if gate.source(slot).is_some() {
                "loading"
            } else {
                "empty"
            }
        };
        let mut line = format!(
            "upload: {}, capture: {}",
            slot_state(Slot::Upload),
            slot_state(Slot::Capture)
        );
        if let Some(verdict) = self.comparator.latest() {
            line.push_str(&format!(" | {}", verdict.result));
        }
        line
    }

    /// Upload one file, take one capture, and wait for the verdict.
    pub async fn compare_once(mut self, upload: &Path) -> Result<Verdict> {
        if let Some(update) = self.upload(upload) {
            return Err(update_error(update));
        }
        self.capture();

        loop {
            match self.next_update().await {
                Some(SessionUpdate::Verdict(verdict)) => return Ok(verdict),
                Some(SessionUpdate::Superseded(_)) => continue,
                Some(update) => return Err(update_error(update)),
                None => bail!("session ended without a comparison"),
            }
        }
    }

    /// Drive the session from line commands until `quit`. At end of input the
    /// session finishes outstanding work before returning.
    pub async fn run_interactive<R, W>(mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        while input_open || self.pending > 0 {
            tokio::select! {
                line = lines.next_line(), if input_open => {
                    let Some(line) = line? else {
                        input_open = false;
                        continue;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(Command::Upload(path)) => {
                            if let Some(update) = self.upload(&path) {
                                report(&update, out)?;
                            }
                        }
                        Ok(Command::Capture) => self.capture(),
                        Ok(Command::Status) => writeln!(out, "{}", self.status())?,
                        Ok(Command::Quit) => break,
                        Err(e) => writeln!(out, "{e}")?,
                    }
                }
                Some(event) = self.events_rx.recv(), if self.pending > 0 => {
                    if let Some(update) = self.handle_event(event) {
                        report(&update, out)?;
                    }
                }
            }
            out.flush()?;
        }
        Ok(())
    }
}

fn update_error(update: SessionUpdate) -> anyhow::Error {
    match update {
        SessionUpdate::ComparisonFailed(e) => anyhow::Error::new(e).context("face comparison failed"),
        SessionUpdate::AcquisitionFailed { slot, error } => {
            anyhow::Error::new(error).context(format!("{slot} image unavailable"))
        }
        SessionUpdate::DecodeFailed { slot, error } => {
            anyhow::Error::new(error).context(format!("{slot} image could not be decoded"))
        }
        SessionUpdate::Verdict(_) | SessionUpdate::Superseded(_) => {
            anyhow::anyhow!("unexpected verdict")
        }
    }
}

fn report<W: Write>(update: &SessionUpdate, out: &mut W) -> std::io::Result<()> {
    match update {
        SessionUpdate::Verdict(verdict) => writeln!(out, "{}", verdict.result),
        SessionUpdate::Superseded(verdict) => {
            tracing::debug!(sequence = verdict.pair.sequence, "late verdict not shown");
            Ok(())
        }
        SessionUpdate::ComparisonFailed(e) => writeln!(out, "comparison failed: {e}"),
        SessionUpdate::AcquisitionFailed { slot, error } => writeln!(out, "{slot}: {error}"),
        SessionUpdate::DecodeFailed { slot, error } => writeln!(out, "{slot}: {error}"),
    }
}
