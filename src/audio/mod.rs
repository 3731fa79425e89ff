//! Audio capabilities used by the recorder and player workers.
//!
//! Devices are opened from inside the worker thread that uses them and stay
//! open for as long as the returned [`StreamGuard`] lives.

use std::any::Any;
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

#[cfg(feature = "audio")]
pub mod device;
pub mod null;

/// Receives fixed-size captured frames, called from the capture thread.
pub type FrameSink = Box<dyn FnMut(Vec<i16>) + Send>;

pub trait AudioInput: Send {
    /// Start capturing mono 16-bit frames of exactly `frame_len` samples.
    fn open(&mut self, frame_len: usize, sink: FrameSink) -> Result<StreamGuard>;
}

pub trait AudioOutput: Send {
    /// Start playback pulling from `queue`.
    fn open(&mut self, queue: SampleQueue) -> Result<StreamGuard>;
}

/// Keeps a device stream running; dropping it stops the stream.
pub struct StreamGuard {
    _inner: Box<dyn Any>,
}

impl StreamGuard {
    pub fn new<T: 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// FIFO between the player worker and the output callback.
#[derive(Debug, Clone, Default)]
pub struct SampleQueue {
    inner: Arc<Mutex<VecDeque<i16>>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, samples: &[i16]) {
        self.inner.lock().extend(samples.iter().copied());
    }

    /// Fill `out` from the front of the queue, zero-padding on underflow.
    /// Returns how many real samples were copied.
    pub fn fill(&self, out: &mut [i16]) -> usize {
        let mut q = self.inner.lock();
        let n = out.len().min(q.len());
        for (dst, src) in out.iter_mut().zip(q.drain(..n)) {
            *dst = src;
        }
        out[n..].fill(0);
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sine tone scaled to the 16-bit range.
pub fn tone(sound_rate: u32, freq: f32, duration: f32, amplitude: f32) -> Vec<i16> {
    let n = (sound_rate as f32 * duration) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / sound_rate as f32;
            (amplitude * (2.0 * PI * freq * t).sin() * 32768.0) as i16
        })
        .collect()
}

/// Audible cues the decoder plays instead of (or around) decoded speech.
#[derive(Debug, Clone)]
pub struct Cues {
    pub start: Vec<i16>,
    pub stop: Vec<i16>,
    pub test: Vec<i16>,
    pub error: Vec<i16>,
}

impl Cues {
    pub fn new(sound_rate: u32) -> Self {
        Self {
            start: tone(sound_rate, 880.0, 0.1, 0.3),
            stop: tone(sound_rate, 440.0, 0.1, 0.2),
            test: tone(sound_rate, 660.0, 0.1, 0.1),
            error: tone(sound_rate, 1760.0, 0.1, 0.1),
        }
    }
}
