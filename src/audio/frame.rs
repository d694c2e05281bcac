//! Fixed-size frame extraction from a streaming sample buffer.
//!
//! The client transport only ever receives complete 20ms frames. Incoming
//! resampled audio arrives in arbitrarily sized batches, so this accumulator
//! retains the partial tail until enough samples arrive to complete the next
//! frame.

use std::collections::VecDeque;

use bytes::Bytes;

use super::{FRAME_SAMPLES, samples_to_le_bytes};

/// Accumulates samples and emits only complete fixed-size PCM16LE frames.
///
/// Samples are consumed strictly in FIFO order; a `push` drains as many
/// whole frames as the buffered samples allow and keeps the remainder.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: VecDeque<i16>,
    frame_samples: usize,
}

impl FrameAccumulator {
    /// Create an accumulator producing frames of `frame_samples` samples.
    pub fn new(frame_samples: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(frame_samples * 4),
            frame_samples,
        }
    }

    /// Append samples and return every complete frame now available.
    ///
    /// Never returns a short frame; partial tail data stays buffered.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Bytes> {
        self.buffer.extend(samples.iter().copied());

        let mut frames = Vec::with_capacity(self.buffer.len() / self.frame_samples);
        while self.buffer.len() >= self.frame_samples {
            let frame: Vec<i16> = self.buffer.drain(..self.frame_samples).collect();
            frames.push(Bytes::from(samples_to_le_bytes(&frame)));
        }
        frames
    }

    /// Number of samples retained waiting for the next frame boundary.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard the retained remainder.
    ///
    /// Called on interruption so audio produced afterwards is never stitched
    /// to pre-interruption samples inside one frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Drain the retained remainder as raw samples.
    #[cfg(test)]
    fn take_pending(&mut self) -> Vec<i16> {
        self.buffer.drain(..).collect()
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(FRAME_SAMPLES)
    }
}
