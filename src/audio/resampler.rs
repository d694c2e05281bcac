//! Streaming sample-rate conversion.
//!
//! Built on rubato's FFT resampler, which consumes fixed-size input chunks.
//! Incoming batches are staged in an input buffer; every full 20ms chunk is
//! converted and the tail is retained for the next call, so conversion is
//! continuous across chunk boundaries with no discontinuities.
//!
//! For the rate pairs used here the sample math is exact: 160 samples at
//! 8kHz convert to 320 at 16kHz, and 480 samples at 24kHz convert to 160 at
//! 8kHz.

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

/// Errors from resampler construction or conversion.
///
/// A conversion failure mid-stream is not recoverable at the sample level;
/// callers must treat the owning connection as impaired and tear it down.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Resampler could not be created for the requested rate pair
    #[error("failed to create resampler ({0} -> {1} Hz): {2}")]
    Construction(u32, u32, String),

    /// Sample-rate conversion failed mid-stream
    #[error("sample rate conversion failed: {0}")]
    Conversion(String),
}

/// Stateful mono PCM16 sample-rate converter for one stream direction.
///
/// Each instance is exclusively owned by one direction of one connection;
/// internal filter state carries across calls for the life of the value.
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    staging: Vec<f32>,
    chunk_size: usize,
    input_rate: u32,
    output_rate: u32,
}

impl StreamResampler {
    /// Create a converter between two fixed rates, mono.
    ///
    /// Input is consumed in 20ms chunks of the input rate.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, AudioError> {
        let chunk_size = (input_rate as usize) / 50;
        let resampler =
            FftFixedIn::<f32>::new(input_rate as usize, output_rate as usize, chunk_size, 2, 1)
                .map_err(|e| AudioError::Construction(input_rate, output_rate, e.to_string()))?;

        Ok(Self {
            resampler,
            staging: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            input_rate,
            output_rate,
        })
    }

    /// Convert a batch of samples, returning all output now available.
    ///
    /// Accepts any input length; samples that do not fill a whole chunk are
    /// retained and converted on a later call. Output ordering matches input
    /// ordering exactly.
    pub fn convert(&mut self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        self.staging
            .extend(input.iter().map(|&s| f32::from(s) / 32768.0));

        let mut output = Vec::new();
        while self.staging.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.staging.drain(..self.chunk_size).collect();
            let converted = self
                .resampler
                .process(&[chunk], None)
                .map_err(|e| AudioError::Conversion(e.to_string()))?;

            for &sample in &converted[0] {
                output.push((sample.clamp(-1.0, 1.0) * 32767.0) as i16);
            }
        }

        tracing::trace!(
            input_rate = self.input_rate,
            output_rate = self.output_rate,
            "converted {} -> {} samples",
            input.len(),
            output.len()
        );
        Ok(output)
    }

    /// Number of staged input samples waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.staging.len()
    }

    /// Clear staged input and internal filter state.
    pub fn reset(&mut self) {
        self.staging.clear();
        self.resampler.reset();
    }

    /// Input sample rate in Hz.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output sample rate in Hz.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("input_rate", &self.input_rate)
            .field("output_rate", &self.output_rate)
            .field("chunk_size", &self.chunk_size)
            .field("pending", &self.staging.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        CLIENT_SAMPLE_RATE, FRAME_SAMPLES, FrameAccumulator, LIVE_INPUT_SAMPLE_RATE,
        LIVE_OUTPUT_SAMPLE_RATE,
    };

    #[test]
    fn test_upsample_one_client_chunk() {
        // One 320-byte client chunk (160 samples at 8kHz) must convert to
        // exactly 320 samples (640 bytes) at 16kHz.
        let mut up = StreamResampler::new(CLIENT_SAMPLE_RATE, LIVE_INPUT_SAMPLE_RATE).unwrap();
        let output = up.convert(&vec![0i16; 160]).unwrap();
        assert_eq!(output.len(), 320);
        assert_eq!(up.pending(), 0);
    }

    #[test]
    fn test_downsample_one_second_framing() {
        // 8000 samples arriving at 24kHz consume 16 full 480-sample chunks,
        // producing 2560 samples at 8kHz = exactly 16 complete frames, with
        // the 320-sample input tail retained for the next batch.
        let mut down = StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE).unwrap();
        let mut acc = FrameAccumulator::default();

        let output = down.convert(&vec![0i16; 8000]).unwrap();
        assert_eq!(output.len(), 16 * FRAME_SAMPLES);
        assert_eq!(down.pending(), 320);

        let frames = acc.push(&output);
        assert_eq!(frames.len(), 16);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_output_count_independent_of_batching() {
        // Splitting the same stream into arbitrary batches must yield the
        // same total output count: no samples lost or duplicated at batch
        // boundaries.
        let input: Vec<i16> = (0..4800).map(|i| ((i * 37) % 20000) as i16 - 10000).collect();

        let mut whole = StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE).unwrap();
        let expected = whole.convert(&input).unwrap();

        let mut split = StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE).unwrap();
        let mut collected = Vec::new();
        for chunk in input.chunks(331) {
            collected.extend(split.convert(chunk).unwrap());
        }

        assert_eq!(collected.len(), expected.len());
        assert_eq!(whole.pending(), split.pending());
    }

    #[test]
    fn test_preserves_silence() {
        let mut up = StreamResampler::new(CLIENT_SAMPLE_RATE, LIVE_INPUT_SAMPLE_RATE).unwrap();
        let output = up.convert(&vec![0i16; 480]).unwrap();
        for sample in output {
            assert!(sample.abs() < 10, "non-silent sample: {sample}");
        }
    }

    #[test]
    fn test_reset_clears_staged_input() {
        let mut down = StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE).unwrap();
        down.convert(&vec![5i16; 100]).unwrap();
        assert_eq!(down.pending(), 100);

        down.reset();
        assert_eq!(down.pending(), 0);
    }
}
