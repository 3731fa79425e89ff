//! In-memory stand-ins for the link, vocoder and audio devices.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;

use crate::audio::{AudioInput, AudioOutput, FrameSink, SampleQueue, StreamGuard};
use crate::mode::Mode;
use crate::port::Link;
use crate::vocoder::{CodecError, Vocoder, VocoderFactory};

#[derive(Default)]
struct LinkState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    loopback: bool,
    fail_writes: bool,
}

/// Shared-state link; clones see the same buffers.
#[derive(Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<LinkState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written comes back as inbound bytes.
    pub fn loopback() -> Self {
        let link = Self::new();
        link.state.lock().loopback = true;
        link
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }
}

impl Link for MemoryLink {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut s = self.state.lock();
        let n = s.inbound.len();
        buf.extend(s.inbound.drain(..));
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut s = self.state.lock();
        if s.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device detached"));
        }
        s.written.extend_from_slice(bytes);
        if s.loopback {
            s.inbound.extend(bytes.iter().copied());
        }
        Ok(())
    }
}

/// Encodes a frame to `encoded_len` copies of its first sample's low byte;
/// decodes a chunk to `samples_per_frame` copies of its first byte.
pub struct FakeVocoder {
    mode: Mode,
}

impl Vocoder for FakeVocoder {
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, CodecError> {
        if samples.len() != self.mode.samples_per_frame() {
            return Err(CodecError::FrameSize {
                expected: self.mode.samples_per_frame(),
                got: samples.len(),
            });
        }
        Ok(vec![samples[0] as u8; self.mode.encoded_len()])
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<i16>, CodecError> {
        if chunk.len() != self.mode.encoded_len() {
            return Err(CodecError::ChunkSize {
                expected: self.mode.encoded_len(),
                got: chunk.len(),
            });
        }
        Ok(vec![chunk[0] as i16; self.mode.samples_per_frame()])
    }
}

pub struct FakeVocoders;

impl VocoderFactory for FakeVocoders {
    fn create(&self, mode: Mode) -> Result<Box<dyn Vocoder>, CodecError> {
        Ok(Box::new(FakeVocoder { mode }))
    }
}

/// Delivers a fixed number of frames synchronously on every open.
#[derive(Clone, Default)]
pub struct ScriptedInput {
    pub frames: usize,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

struct CloseCounter(Arc<AtomicUsize>);

impl Drop for CloseCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

impl AudioInput for ScriptedInput {
    fn open(&mut self, frame_len: usize, mut sink: FrameSink) -> Result<StreamGuard> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        for i in 0..self.frames {
            sink(vec![i as i16; frame_len]);
        }
        Ok(StreamGuard::new(CloseCounter(self.closed.clone())))
    }
}

/// Never drains; hands the queue back to the test.
#[derive(Clone, Default)]
pub struct HeldOutput {
    pub queue: Arc<Mutex<Option<SampleQueue>>>,
}

impl HeldOutput {
    /// Drain everything queued so far.
    pub fn samples(&self) -> Vec<i16> {
        let Some(queue) = self.queue.lock().clone() else {
            return Vec::new();
        };
        let mut out = vec![0; queue.len()];
        queue.fill(&mut out);
        out
    }
}

impl AudioOutput for HeldOutput {
    fn open(&mut self, queue: SampleQueue) -> Result<StreamGuard> {
        *self.queue.lock() = Some(queue);
        Ok(StreamGuard::new(()))
    }
}
