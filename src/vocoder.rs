//! Vocoder capability, consumed as an opaque per-mode codec.

use codec2::{Codec2, Codec2Mode};
use thiserror::Error;

use crate::mode::Mode;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("mode {0} is not supported by this vocoder")]
    Unsupported(Mode),
    #[error("expected {expected} samples per frame, got {got}")]
    FrameSize { expected: usize, got: usize },
    #[error("expected {expected} bytes per compressed frame, got {got}")]
    ChunkSize { expected: usize, got: usize },
}

/// One codec instance, fixed to a mode for its lifetime.
pub trait Vocoder: Send {
    /// `samples.len()` must be the mode's samples per frame.
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, CodecError>;
    /// `chunk.len()` must be the mode's encoded length.
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<i16>, CodecError>;
}

pub trait VocoderFactory: Send + Sync {
    fn create(&self, mode: Mode) -> Result<Box<dyn Vocoder>, CodecError>;

    fn supports(&self, mode: Mode) -> bool {
        self.create(mode).is_ok()
    }
}

/// Codec 2 through the pure-Rust `codec2` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec2Factory;

struct Codec2Vocoder {
    mode: Mode,
    codec: Codec2,
}

fn codec2_mode(mode: Mode) -> Option<Codec2Mode> {
    match mode {
        Mode::Mode3200 => Some(Codec2Mode::MODE_3200),
        Mode::Mode2400 => Some(Codec2Mode::MODE_2400),
        Mode::Mode1600 => Some(Codec2Mode::MODE_1600),
        Mode::Mode1400 => Some(Codec2Mode::MODE_1400),
        Mode::Mode1300 => Some(Codec2Mode::MODE_1300),
        Mode::Mode1200 => Some(Codec2Mode::MODE_1200),
        // 700C has no pure-Rust port
        Mode::Mode700 => None,
    }
}

impl VocoderFactory for Codec2Factory {
    fn supports(&self, mode: Mode) -> bool {
        codec2_mode(mode).is_some()
    }

    fn create(&self, mode: Mode) -> Result<Box<dyn Vocoder>, CodecError> {
        let c2 = codec2_mode(mode).ok_or(CodecError::Unsupported(mode))?;
        Ok(Box::new(Codec2Vocoder {
            mode,
            codec: Codec2::new(c2),
        }))
    }
}

impl Vocoder for Codec2Vocoder {
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, CodecError> {
        let expected = self.mode.samples_per_frame();
        if samples.len() != expected {
            return Err(CodecError::FrameSize {
                expected,
                got: samples.len(),
            });
        }
        let mut bits = vec![0u8; self.mode.encoded_len()];
        self.codec.encode(&mut bits, samples);
        Ok(bits)
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<i16>, CodecError> {
        let expected = self.mode.encoded_len();
        if chunk.len() != expected {
            return Err(CodecError::ChunkSize {
                expected,
                got: chunk.len(),
            });
        }
        let mut samples = vec![0i16; self.mode.samples_per_frame()];
        self.codec.decode(&mut samples, chunk);
        Ok(samples)
    }
}
