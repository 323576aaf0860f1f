//! Readiness gate for the (upload, capture) image pair.
//!
//! Each slot carries a generation counter that is bumped whenever its source
//! is replaced. Replacing a source clears readiness immediately, and decode
//! completions are matched against the generation they were issued for, so a
//! slow decode of a superseded image can never mark the new source ready.

use crate::handle::ImageHandle;
use crate::types::Slot;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;

/// Issued by [`ReadinessGate::set_source`]; identifies the decode that must
/// complete before the slot becomes ready.
#[derive(Debug, Clone)]
pub struct DecodeTicket {
    pub slot: Slot,
    pub generation: u64,
    pub handle: ImageHandle,
}

/// Identity of one compared pair.
///
/// Ordered by `sequence`, the order in which pairs were triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairId {
    pub sequence: u64,
    pub upload_generation: u64,
    pub capture_generation: u64,
}

/// Both decoded images of a pair that has not been compared yet.
#[derive(Debug, Clone)]
pub struct ReadyPair {
    pub id: PairId,
    pub upload: Arc<RgbImage>,
    pub capture: Arc<RgbImage>,
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    source: Option<ImageHandle>,
    /// Present iff the current source finished decoding.
    decoded: Option<Arc<RgbImage>>,
}

#[derive(Debug, Default)]
pub struct ReadinessGate {
    upload: SlotState,
    capture: SlotState,
    /// Generations of the last pair handed out by `evaluate`.
    last_compared: Option<(u64, u64)>,
    triggered: u64,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, slot: Slot) -> &SlotState {
        match slot {
            Slot::Upload => &self.upload,
            Slot::Capture => &self.capture,
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        match slot {
            Slot::Upload => &mut self.upload,
            Slot::Capture => &mut self.capture,
        }
    }

    /// Replace a slot's source. Readiness is cleared before the ticket for the
    /// new decode is handed out.
    pub fn set_source(&mut self, slot: Slot, handle: ImageHandle) -> DecodeTicket {
        let state = self.slot_mut(slot);
        state.generation += 1;
        state.decoded = None;
        state.source = Some(handle.clone());
        DecodeTicket {
            slot,
            generation: state.generation,
            handle,
        }
    }

    /// Record a finished decode. Returns `false` (and changes nothing) when
    /// the ticket belongs to a source that has since been replaced.
    pub fn mark_decoded(&mut self, ticket: &DecodeTicket, image: Arc<RgbImage>) -> bool {
        let state = self.slot_mut(ticket.slot);
        if state.generation != ticket.generation {
            return false;
        }
        state.decoded = Some(image);
        true
    }

    pub fn is_ready(&self, slot: Slot) -> bool {
        self.slot(slot).decoded.is_some()
    }

    pub fn generation(&self, slot: Slot) -> u64 {
        self.slot(slot).generation
    }

    pub fn source(&self, slot: Slot) -> Option<&ImageHandle> {
        self.slot(slot).source.as_ref()
    }

    /// Number of pairs handed out so far.
    pub fn triggered(&self) -> u64 {
        self.triggered
    }

    /// Hand out the current pair if both slots are ready and this exact pair
    /// has not been handed out before.
    pub fn evaluate(&mut self) -> Option<ReadyPair> {
        let upload = self.upload.decoded.clone()?;
        let capture = self.capture.decoded.clone()?;

        let generations = (self.upload.generation, self.capture.generation);
        if self.last_compared == Some(generations) {
            return None;
        }
        self.last_compared = Some(generations);
        self.triggered += 1;

        Some(ReadyPair {
            id: PairId {
                sequence: self.triggered,
                upload_generation: generations.0,
                capture_generation: generations.1,
            },
            upload,
            capture,
        })
    }
}
