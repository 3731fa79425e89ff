//! Default system microphone and speaker through cpal.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use tracing::warn;

use super::{AudioInput, AudioOutput, FrameSink, SampleQueue, StreamGuard};

fn mono(sound_rate: u32, buffer_size: BufferSize) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: SampleRate(sound_rate),
        buffer_size,
    }
}

#[derive(Debug, Clone)]
pub struct Microphone {
    pub sound_rate: u32,
}

impl AudioInput for Microphone {
    fn open(&mut self, frame_len: usize, mut sink: FrameSink) -> Result<StreamGuard> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?;
        let config = mono(self.sound_rate, BufferSize::Default);

        // callbacks come in whatever size the backend likes; re-frame them
        let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for &s in data {
                        pending.push(s);
                        if pending.len() == frame_len {
                            sink(std::mem::replace(&mut pending, Vec::with_capacity(frame_len)));
                        }
                    }
                },
                |err| warn!("input stream error: {}", err),
                None,
            )
            .context("building input stream")?;
        stream.play().context("starting input stream")?;
        Ok(StreamGuard::new(stream))
    }
}

#[derive(Debug, Clone)]
pub struct Speaker {
    pub sound_rate: u32,
    pub frames_per_buffer: u32,
}

impl AudioOutput for Speaker {
    fn open(&mut self, queue: SampleQueue) -> Result<StreamGuard> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        let config = mono(self.sound_rate, BufferSize::Fixed(self.frames_per_buffer));

        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    queue.fill(out);
                },
                |err| warn!("output stream error: {}", err),
                None,
            )
            .context("building output stream")?;
        stream.play().context("starting output stream")?;
        Ok(StreamGuard::new(stream))
    }
}
