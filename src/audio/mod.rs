//! Audio primitives for the bridging pipeline.
//!
//! All audio in this crate is single-channel PCM 16-bit signed little-endian.
//! The client side runs at 8kHz; the Gemini Live API accepts 16kHz input and
//! produces 24kHz output.

pub mod frame;
pub mod resampler;

pub use frame::FrameAccumulator;
pub use resampler::{AudioError, StreamResampler};

/// Sample rate of audio exchanged with the client transport.
pub const CLIENT_SAMPLE_RATE: u32 = 8000;

/// Sample rate the Gemini Live API accepts for input audio.
pub const LIVE_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio produced by the Gemini Live API.
pub const LIVE_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Samples per canonical client frame (20ms at 8kHz).
pub const FRAME_SAMPLES: usize = 160;

/// Bytes per canonical client frame (160 samples of PCM16).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// MIME descriptor attached to audio forwarded to the Gemini Live API.
pub const LIVE_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Interpret little-endian PCM16 bytes as samples.
///
/// A trailing odd byte is ignored; callers that read from a raw byte stream
/// are responsible for re-aligning chunks before decoding.
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian PCM16 bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_round_trip() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 12345];
        let bytes = samples_to_le_bytes(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(samples_from_le_bytes(&bytes), samples);
    }

    #[test]
    fn test_odd_tail_ignored() {
        let bytes = [0x01, 0x02, 0x03];
        assert_eq!(samples_from_le_bytes(&bytes), vec![0x0201]);
    }

    #[test]
    fn test_frame_constants() {
        // 20ms at the client rate.
        assert_eq!(FRAME_SAMPLES, (CLIENT_SAMPLE_RATE as usize) / 50);
        assert_eq!(FRAME_BYTES, 320);
    }
}
