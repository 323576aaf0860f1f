//! Readiness-gated comparator.
//!
//! Owns the [`ReadinessGate`], the face analyzer and the result board. Every
//! operation that changes readiness calls [`Comparator::evaluate`] itself; a
//! ready pair is compared exactly once on a spawned task.
//!
//! Comparisons are not cancelled when a slot is replaced mid-flight. When two
//! comparisons overlap, the board keeps the verdict of the most recently
//! triggered pair: an older pair that resolves late is discarded.

use crate::analyzer::{AnalysisError, FaceAnalyzer};
use crate::gate::{DecodeTicket, PairId, ReadinessGate, ReadyPair};
use crate::handle::ImageHandle;
use crate::types::{ComparisonResult, Slot};
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A published comparison result and the pair it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub pair: PairId,
    pub result: ComparisonResult,
}

/// Handle to an in-flight comparison.
pub type ComparisonTask = JoinHandle<Result<Verdict, AnalysisError>>;

/// Run detection on both images concurrently and classify the outcome.
///
/// Both detections must finish; an error from either aborts the comparison.
pub async fn compare_faces<A: FaceAnalyzer>(
    analyzer: &A,
    upload: Arc<RgbImage>,
    capture: Arc<RgbImage>,
) -> Result<ComparisonResult, AnalysisError> {
    let (upload_face, capture_face) =
        tokio::try_join!(analyzer.detect_face(upload), analyzer.detect_face(capture))?;

    let result = ComparisonResult::from_detections(upload_face.as_ref(), capture_face.as_ref());
    if result == ComparisonResult::Undetected {
        tracing::debug!(
            upload_detected = upload_face.is_some(),
            capture_detected = capture_face.is_some(),
            "face missing from pair"
        );
    }
    Ok(result)
}

pub struct Comparator<A> {
    gate: ReadinessGate,
    analyzer: Arc<A>,
    board: Arc<watch::Sender<Option<Verdict>>>,
}

impl<A: FaceAnalyzer> Comparator<A> {
    pub fn new(analyzer: Arc<A>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            gate: ReadinessGate::new(),
            analyzer,
            board: Arc::new(tx),
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Latest published verdict, if any comparison has completed.
    pub fn latest(&self) -> Option<Verdict> {
        *self.board.borrow()
    }

    /// Receiver notified every time a verdict is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Verdict>> {
        self.board.subscribe()
    }

    pub fn set_upload_source(&mut self, handle: ImageHandle) -> DecodeTicket {
        self.set_source(Slot::Upload, handle)
    }

    pub fn set_capture_source(&mut self, handle: ImageHandle) -> DecodeTicket {
        self.set_source(Slot::Capture, handle)
    }

    /// Replace a slot's source and clear its readiness. The caller decodes
    /// the ticket's handle and reports back through [`on_decoded`](Self::on_decoded).
    pub fn set_source(&mut self, slot: Slot, handle: ImageHandle) -> DecodeTicket {
        let ticket = self.gate.set_source(slot, handle);
        tracing::debug!(%slot, generation = ticket.generation, "source replaced");
        // Readiness only dropped, so this never starts a comparison.
        let started = self.evaluate();
        debug_assert!(started.is_none(), "replacing a source started a comparison");
        ticket
    }

    pub fn on_upload_decoded(
        &mut self,
        ticket: &DecodeTicket,
        image: Arc<RgbImage>,
    ) -> Option<ComparisonTask> {
        debug_assert_eq!(ticket.slot, Slot::Upload);
        self.on_decoded(ticket, image)
    }

    pub fn on_capture_decoded(
        &mut self,
        ticket: &DecodeTicket,
        image: Arc<RgbImage>,
    ) -> Option<ComparisonTask> {
        debug_assert_eq!(ticket.slot, Slot::Capture);
        self.on_decoded(ticket, image)
    }

    /// Mark the ticket's slot ready and evaluate. Decodes of superseded
    /// sources are dropped.
    pub fn on_decoded(
        &mut self,
        ticket: &DecodeTicket,
        image: Arc<RgbImage>,
    ) -> Option<ComparisonTask> {
        if !self.gate.mark_decoded(ticket, image) {
            tracing::debug!(
                slot = %ticket.slot,
                generation = ticket.generation,
                current = self.gate.generation(ticket.slot),
                "ignoring decode of superseded source"
            );
            return None;
        }
        tracing::debug!(slot = %ticket.slot, generation = ticket.generation, "slot ready");
        self.evaluate()
    }

    /// Start a comparison if both slots are ready and the pair is new.
    ///
    /// Must be called from within a tokio runtime.
    pub fn evaluate(&mut self) -> Option<ComparisonTask> {
        let pair = self.gate.evaluate()?;
        tracing::info!(
            sequence = pair.id.sequence,
            upload_generation = pair.id.upload_generation,
            capture_generation = pair.id.capture_generation,
            "comparing faces"
        );

        let analyzer = Arc::clone(&self.analyzer);
        let board = Arc::clone(&self.board);
        Some(tokio::spawn(async move {
            run_comparison(&*analyzer, &board, pair).await
        }))
    }
}

async fn run_comparison<A: FaceAnalyzer>(
    analyzer: &A,
    board: &watch::Sender<Option<Verdict>>,
    pair: ReadyPair,
) -> Result<Verdict, AnalysisError> {
    let result = match compare_faces(analyzer, pair.upload, pair.capture).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(sequence = pair.id.sequence, error = %e, "face comparison failed");
            return Err(e);
        }
    };

    let verdict = Verdict {
        pair: pair.id,
        result,
    };
    publish(board, verdict);
    Ok(verdict)
}

/// Put a verdict on the board unless a later-triggered pair already resolved.
fn publish(board: &watch::Sender<Option<Verdict>>, verdict: Verdict) -> bool {
    board.send_if_modified(|current| match current {
        Some(prev) if prev.pair.sequence > verdict.pair.sequence => {
            tracing::debug!(
                sequence = verdict.pair.sequence,
                published = prev.pair.sequence,
                "discarding verdict of superseded pair"
            );
            false
        }
        _ => {
            tracing::info!(
                sequence = verdict.pair.sequence,
                distance = ?verdict.result.distance(),
                result = %verdict.result,
                "verdict published"
            );
            *current = Some(verdict);
            true
        }
    })
}
