// ============================================================================
// IMAGE CACHE — decoded original and cut-out, guarded by generation tokens
// ============================================================================
//
// Each slot remembers the token of the decode it is waiting for. A completion
// carrying any other token is stale (a newer upload or removal superseded it)
// and is dropped, so a slow decode can never overwrite a newer entry.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::mpsc;

use image::RgbaImage;

use crate::io::{DecodeError, decode_image};
use crate::logger;
use crate::ops::transform::{FitSize, fit_within, resample};

/// Which cached image a decode belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Original,
    Processed,
}

/// The display-sized copy of a decoded image, built once per decode. The
/// full-resolution raster is dropped; only its size is kept.
#[derive(Debug)]
pub struct CachedImage {
    pub source_size: (u32, u32),
    pub display: RgbaImage,
    pub fit: FitSize,
}

impl CachedImage {
    /// Fit `full` into `max_width × max_height` and resample the display copy.
    pub fn build(full: RgbaImage, max_width: u32, max_height: u32) -> Self {
        let source_size = full.dimensions();
        let fit = fit_within(source_size.0, source_size.1, max_width, max_height);
        let (w, h) = fit.to_pixels();
        let display = if (w, h) == source_size { full } else { resample(&full, w, h) };
        Self { source_size, display, fit }
    }
}

/// Proof that a decode was requested for a slot at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeTicket {
    pub slot: Slot,
    pub token: u64,
}

#[derive(Default)]
struct SlotState {
    image: Option<Arc<CachedImage>>,
    pending: Option<u64>,
}

impl SlotState {
    fn clear(&mut self) {
        self.image = None;
        self.pending = None;
    }
}

/// The two-slot image cache owned by a project.
pub struct ImageCache {
    original: SlotState,
    processed: SlotState,
    next_token: u64,
    max_width: u32,
    max_height: u32,
}

impl ImageCache {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            original: SlotState::default(),
            processed: SlotState::default(),
            next_token: 1,
            max_width,
            max_height,
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        match slot {
            Slot::Original => &mut self.original,
            Slot::Processed => &mut self.processed,
        }
    }

    fn slot(&self, slot: Slot) -> &SlotState {
        match slot {
            Slot::Original => &self.original,
            Slot::Processed => &self.processed,
        }
    }

    fn issue(&mut self, slot: Slot) -> DecodeTicket {
        let token = self.next_token;
        self.next_token += 1;
        self.slot_mut(slot).pending = Some(token);
        DecodeTicket { slot, token }
    }

    /// A new source image: both slots are emptied, and only the returned
    /// ticket may fill the original slot.
    pub fn begin_original(&mut self) -> DecodeTicket {
        self.original.clear();
        self.processed.clear();
        self.issue(Slot::Original)
    }

    /// A new cut-out: the processed slot is emptied and awaits the ticket.
    pub fn begin_processed(&mut self) -> DecodeTicket {
        self.processed.clear();
        self.issue(Slot::Processed)
    }

    /// Store a finished decode. Returns `false` (and drops `image`) when the
    /// ticket is stale.
    pub fn complete(&mut self, ticket: DecodeTicket, image: CachedImage) -> bool {
        let slot = self.slot_mut(ticket.slot);
        if slot.pending != Some(ticket.token) {
            log::debug!("Discarding stale {:?} decode #{}", ticket.slot, ticket.token);
            return false;
        }
        slot.pending = None;
        slot.image = Some(Arc::new(image));
        true
    }

    /// A decode failed: the slot stays unset. Stale failures are ignored.
    pub fn fail(&mut self, ticket: DecodeTicket) -> bool {
        let slot = self.slot_mut(ticket.slot);
        if slot.pending != Some(ticket.token) {
            return false;
        }
        slot.pending = None;
        true
    }

    /// Drop every entry and forget all pending decodes.
    pub fn invalidate(&mut self) {
        self.original.clear();
        self.processed.clear();
    }

    pub fn original(&self) -> Option<&Arc<CachedImage>> {
        self.original.image.as_ref()
    }

    pub fn processed(&self) -> Option<&Arc<CachedImage>> {
        self.processed.image.as_ref()
    }

    pub fn is_pending(&self, slot: Slot) -> bool {
        self.slot(slot).pending.is_some()
    }
}

/// A decode that finished on the worker pool.
pub struct DecodeOutcome {
    pub ticket: DecodeTicket,
    pub result: Result<CachedImage, DecodeError>,
}

/// Decodes encoded bytes on the rayon pool; results come back through `poll`.
pub struct ImageLoader {
    sender: mpsc::Sender<DecodeOutcome>,
    receiver: mpsc::Receiver<DecodeOutcome>,
    in_flight: usize,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Decode `bytes` and build the display copy off the calling thread.
    pub fn spawn(&mut self, ticket: DecodeTicket, bytes: Arc<Vec<u8>>, bounds: (u32, u32)) {
        let sender = self.sender.clone();
        self.in_flight += 1;
        rayon::spawn(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                decode_image(&bytes).map(|full| CachedImage::build(full, bounds.0, bounds.1))
            }))
            .unwrap_or_else(|payload| Err(DecodeError::Panicked(logger::panic_message(payload.as_ref()))));
            let _ = sender.send(DecodeOutcome { ticket, result });
        });
    }

    pub fn poll(&mut self) -> Option<DecodeOutcome> {
        let outcome = self.receiver.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(outcome)
    }

    /// Block for the next outcome if any decode is running.
    pub fn wait(&mut self) -> Option<DecodeOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let outcome = self.receiver.recv().ok()?;
        self.in_flight -= 1;
        Some(outcome)
    }
}
