//! Deviceless audio: a silent microphone and a speaker that discards.
//! Both run at the real sample rate so link timing stays realistic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::{AudioInput, AudioOutput, FrameSink, SampleQueue, StreamGuard};

struct Pacer {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Pacer {
    fn spawn(
        name: &str,
        period: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                while flag.load(Ordering::Relaxed) {
                    tick();
                    if let Some(wait) = next.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    }
                    next += period;
                }
            })
            .with_context(|| format!("spawning {}", name))?;
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn period(samples: usize, sound_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / sound_rate.max(1) as f64)
}

/// Produces zeroed frames in real time.
#[derive(Debug, Clone)]
pub struct Silence {
    pub sound_rate: u32,
}

impl AudioInput for Silence {
    fn open(&mut self, frame_len: usize, mut sink: FrameSink) -> Result<StreamGuard> {
        let pacer = Pacer::spawn("silence", period(frame_len, self.sound_rate), move || {
            sink(vec![0; frame_len])
        })?;
        Ok(StreamGuard::new(pacer))
    }
}

/// Drains the player queue in real time and drops the samples.
#[derive(Debug, Clone)]
pub struct Discard {
    pub sound_rate: u32,
    pub frames_per_buffer: usize,
}

impl AudioOutput for Discard {
    fn open(&mut self, queue: SampleQueue) -> Result<StreamGuard> {
        let mut buf = vec![0i16; self.frames_per_buffer.max(1)];
        let pacer = Pacer::spawn("discard", period(buf.len(), self.sound_rate), move || {
            queue.fill(&mut buf);
        })?;
        Ok(StreamGuard::new(pacer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn silence_delivers_frames_until_dropped() {
        let (tx, rx) = unbounded();
        let mut input = Silence { sound_rate: 8000 };
        let guard = input
            .open(160, Box::new(move |f| {
                let _ = tx.send(f);
            }))
            .unwrap();
        let frame = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame, vec![0i16; 160]);
        drop(guard);
        // sender went away with the pacer thread
        while rx.recv_timeout(Duration::from_secs(1)).is_ok() {}
    }

    #[test]
    fn discard_drains_queue() {
        let queue = SampleQueue::new();
        queue.push(&[1; 640]);
        let mut out = Discard {
            sound_rate: 8000,
            frames_per_buffer: 320,
        };
        let _guard = out.open(queue.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !queue.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(queue.is_empty());
    }
}
