use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::audio::Cues;
use crate::job::{Job, Role};
use crate::mode::Mode;
use crate::packet::{FrameBody, Packet, PacketReader};
use crate::stats::{DecoderStat, Stat, bits_per_second};
use crate::vocoder::{Vocoder, VocoderFactory};
use crate::worker::{Context, Worker};

/// Largest forward jump in probe indexes still counted as loss. Bigger
/// jumps are taken as a restarted sender. Tunable, not part of the protocol.
pub const LOSS_WINDOW: i64 = 10;

/// Packets lost between two consecutive probes.
pub fn lost_between(last: i32, index: i32) -> u64 {
    let gap = index as i64 - last as i64;
    if gap == 1 || gap <= 0 || gap > LOSS_WINDOW {
        0
    } else {
        gap as u64
    }
}

/// One-way latency estimate for a probe stamped at `embedded` seconds.
pub fn delay(elapsed: f64, embedded: f32) -> f64 {
    elapsed - embedded as f64
}

struct RxStream {
    mode: Mode,
    vocoder: Option<Box<dyn Vocoder>>,
    started: Instant,
    last_index: i32,
}

/// Turns the raw inbound byte stream back into audio.
pub struct DecoderWorker {
    vocoders: Arc<dyn VocoderFactory>,
    cues: Cues,
    reader: PacketReader,
    stat: DecoderStat,
    stream: Option<RxStream>,
}

impl DecoderWorker {
    pub fn new(vocoders: Arc<dyn VocoderFactory>, cues: Cues) -> Self {
        Self {
            vocoders,
            cues,
            reader: PacketReader::new(),
            stat: DecoderStat::default(),
            stream: None,
        }
    }

    fn receive(&mut self, ctx: &Context, bytes: &[u8]) {
        self.reader.extend(bytes);
        let packets: Vec<_> = self.reader.packets().collect();
        for packet in packets {
            let samples = match packet {
                Ok(packet) => {
                    debug!("rx {:?}, test: {}", packet.kind(), packet.is_test());
                    self.stat.rx_packets += 1;
                    self.handle(packet)
                }
                Err(e) => {
                    warn!("dropping malformed packet: {}", e);
                    self.stat.rx_errors += 1;
                    Some(self.cues.error.clone())
                }
            };
            if let Some(samples) = samples {
                ctx.send(Role::Player, Job::Play { samples });
            }
        }
        debug!("{} bytes left buffered", self.reader.buffered());

        if let Some(current) = self.stat.rx_current.as_mut() {
            *current += bytes.len() as u64;
            self.stat.rx_speed = bits_per_second(*current, self.stat.rx_duration);
        }
        ctx.push_stat(Stat::Decoder(self.stat.clone()));
    }

    /// Update telemetry for one packet and pick what to play.
    fn handle(&mut self, packet: Packet) -> Option<Vec<i16>> {
        match packet {
            Packet::StreamStart { test, mode } => {
                info!("stream start {}, test: {}", mode, test);
                let vocoder = match self.vocoders.create(mode) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("no vocoder for {}: {}", mode, e);
                        None
                    }
                };
                self.stat.rx_mode = Some(mode);
                self.stat.rx_duration = 0.0;
                self.stat.rx_lost = Some(0);
                self.stat.rx_current = Some(0);
                self.stat.rx_delay = None;
                self.stream = Some(RxStream {
                    mode,
                    vocoder,
                    started: Instant::now(),
                    last_index: 0,
                });
                Some(self.cues.start.clone())
            }
            Packet::StreamFrame(body) => {
                let Some(stream) = self.stream.as_mut() else {
                    warn!("frame before stream start");
                    return None;
                };
                self.stat.rx_duration = stream.started.elapsed().as_secs_f64();
                match body {
                    FrameBody::Probe {
                        duration,
                        packet_index,
                    } => {
                        self.stat.rx_delay = Some(delay(self.stat.rx_duration, duration));
                        let lost = lost_between(stream.last_index, packet_index);
                        if lost > 0 {
                            self.stat.rx_lost = Some(self.stat.rx_lost.unwrap_or(0) + lost);
                        }
                        stream.last_index = packet_index;
                        Some(self.cues.test.clone())
                    }
                    FrameBody::Audio(block) => decode_block(stream, &block),
                }
            }
            Packet::StreamStop { duration } => {
                let Some(stream) = self.stream.take() else {
                    warn!("stop without stream start");
                    return None;
                };
                self.stat.rx_duration = stream.started.elapsed().as_secs_f64();
                if let Some(d) = duration {
                    self.stat.rx_delay = Some(delay(self.stat.rx_duration, d));
                }
                info!("stream stop after {:.1}s", self.stat.rx_duration);
                Some(self.cues.stop.clone())
            }
        }
    }
}

fn decode_block(stream: &mut RxStream, block: &[u8]) -> Option<Vec<i16>> {
    let Some(vocoder) = stream.vocoder.as_mut() else {
        warn!("no vocoder, dropping audio");
        return None;
    };
    let mut samples = Vec::with_capacity(
        block.len() / stream.mode.encoded_len() * stream.mode.samples_per_frame(),
    );
    for chunk in block.chunks(stream.mode.encoded_len()) {
        match vocoder.decode(chunk) {
            Ok(s) => samples.extend_from_slice(&s),
            Err(e) => warn!("dropping chunk: {}", e),
        }
    }
    Some(samples)
}

impl Worker for DecoderWorker {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        loop {
            match ctx.next_job() {
                Job::Stop => return Ok(()),
                Job::Recv { bytes } => self.receive(ctx, &bytes),
                other => warn!("ignoring {:?}", other),
            }
        }
    }
}
