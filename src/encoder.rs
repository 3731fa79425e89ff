use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::job::{Job, Role};
use crate::mode::Mode;
use crate::packet::{PacketKind, encode_stream_frame, encode_stream_start, encode_stream_stop};
use crate::stats::{EncoderStat, Stat};
use crate::vocoder::{Vocoder, VocoderFactory};
use crate::worker::{Context, Worker};

struct TxStream {
    test: bool,
    vocoder: Box<dyn Vocoder>,
    started: Instant,
    buffer: Vec<u8>,
    chunks: usize,
    packet_index: i32,
}

impl TxStream {
    fn elapsed(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }
}

/// Compresses raw frames and batches `chunks` of them per STREAM_FRAME.
pub struct EncoderWorker {
    vocoders: Arc<dyn VocoderFactory>,
    chunks: usize,
    stat: EncoderStat,
    stream: Option<TxStream>,
}

impl EncoderWorker {
    pub fn new(vocoders: Arc<dyn VocoderFactory>, chunks: usize) -> Self {
        Self {
            vocoders,
            chunks: chunks.max(1),
            stat: EncoderStat::default(),
            stream: None,
        }
    }

    fn send(&mut self, ctx: &Context, kind: PacketKind, bytes: Vec<u8>) {
        ctx.send(Role::Serial, Job::Send { kind, bytes });
        self.stat.tx_packets += 1;
    }

    fn stream_start(&mut self, ctx: &Context, mode: Mode, test: bool) -> Result<()> {
        let vocoder = match self.vocoders.create(mode) {
            Ok(v) => v,
            Err(e) => {
                warn!("cannot start {} stream: {}", mode, e);
                self.stream = None;
                return Ok(());
            }
        };
        info!("stream start {}, test: {}", mode, test);
        self.stream = Some(TxStream {
            test,
            vocoder,
            started: Instant::now(),
            buffer: Vec::new(),
            chunks: 0,
            packet_index: 0,
        });
        self.send(ctx, PacketKind::StreamStart, encode_stream_start(test, mode)?);
        Ok(())
    }

    fn stream_frame(&mut self, ctx: &Context, samples: &[i16]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            warn!("mode not defined, dropping frame");
            return Ok(());
        };
        match stream.vocoder.encode(samples) {
            Ok(bits) => stream.buffer.extend_from_slice(&bits),
            Err(e) => {
                warn!("dropping frame: {}", e);
                return Ok(());
            }
        }
        stream.chunks += 1;
        if stream.chunks >= self.chunks {
            self.flush(ctx)?;
        }
        Ok(())
    }

    fn flush(&mut self, ctx: &Context) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        stream.packet_index = stream.packet_index.wrapping_add(1);
        let bytes = encode_stream_frame(
            stream.test,
            &stream.buffer,
            stream.elapsed(),
            stream.packet_index,
        )?;
        stream.buffer.clear();
        stream.chunks = 0;
        self.send(ctx, PacketKind::StreamFrame, bytes);
        Ok(())
    }

    fn stream_stop(&mut self, ctx: &Context) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            warn!("no stream to stop");
            return Ok(());
        };
        if !stream.buffer.is_empty() {
            self.flush(ctx)?;
        }
        if let Some(stream) = self.stream.take() {
            let bytes = encode_stream_stop(stream.test, stream.elapsed())?;
            self.send(ctx, PacketKind::StreamStop, bytes);
            info!("stream stop after {} packets", stream.packet_index);
        }
        Ok(())
    }
}

impl Worker for EncoderWorker {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        loop {
            match ctx.next_job() {
                Job::Stop => return Ok(()),
                Job::StreamStart { mode, test } => self.stream_start(ctx, mode, test)?,
                Job::StreamFrame { samples } => self.stream_frame(ctx, &samples)?,
                Job::StreamStop => self.stream_stop(ctx)?,
                other => {
                    warn!("ignoring {:?}", other);
                    continue;
                }
            }
            ctx.push_stat(Stat::Encoder(self.stat.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Mailboxes;
    use crate::packet::{FrameBody, Packet, PacketReader};
    use crate::stats::stat_channel;
    use crate::testing::FakeVocoders;
    use crate::worker::{WorkerHandle, spawn};
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    struct Rig {
        mailboxes: Mailboxes,
        serial_rx: Receiver<Job>,
        handle: WorkerHandle,
    }

    fn rig(chunks: usize) -> Rig {
        let (mailboxes, receivers) = Mailboxes::new();
        let (sink, _collector) = stat_channel();
        let serial_rx = receivers[0].1.clone();
        let encoder_rx = receivers[1].1.clone();
        let ctx = Context::new(Role::Encoder, encoder_rx, mailboxes.clone(), sink);
        let worker = EncoderWorker::new(Arc::new(FakeVocoders), chunks);
        Rig {
            mailboxes,
            serial_rx,
            handle: spawn(worker, ctx).unwrap(),
        }
    }

    /// Stop the encoder and decode everything it sent to the serial worker.
    fn finish(rig: Rig) -> Vec<(PacketKind, Packet)> {
        rig.mailboxes.send(Role::Encoder, Job::Stop);
        rig.handle.join();
        let mut out = Vec::new();
        while let Ok(job) = rig.serial_rx.recv_timeout(Duration::from_secs(2)) {
            match job {
                Job::Send { kind, bytes } => {
                    let mut reader = PacketReader::new();
                    reader.extend(&bytes);
                    let packets: Vec<_> = reader.packets().collect();
                    assert_eq!(packets.len(), 1);
                    out.push((kind, packets.into_iter().next().unwrap().unwrap()));
                }
                Job::Stop => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        out
    }

    fn frame(mode: Mode, v: i16) -> Job {
        Job::StreamFrame {
            samples: vec![v; mode.samples_per_frame()],
        }
    }

    #[test]
    fn chunks_frames_and_flushes_on_stop() {
        let mode = Mode::Mode1300;
        let rig = rig(4);
        rig.mailboxes.send(Role::Encoder, Job::StreamStart { mode, test: false });
        for i in 0..9 {
            rig.mailboxes.send(Role::Encoder, frame(mode, i));
        }
        rig.mailboxes.send(Role::Encoder, Job::StreamStop);
        let sent = finish(rig);

        let kinds: Vec<_> = sent.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                PacketKind::StreamStart,
                PacketKind::StreamFrame,
                PacketKind::StreamFrame,
                PacketKind::StreamFrame,
                PacketKind::StreamStop,
            ]
        );
        assert_eq!(sent[0].1, Packet::StreamStart { test: false, mode });

        let len = mode.encoded_len();
        let audio: Vec<Vec<u8>> = sent[1..4]
            .iter()
            .map(|(_, p)| match p {
                Packet::StreamFrame(FrameBody::Audio(a)) => a.clone(),
                p => panic!("unexpected {:?}", p),
            })
            .collect();
        assert_eq!(audio[0].len(), 4 * len);
        assert_eq!(audio[1].len(), 4 * len);
        assert_eq!(audio[2], vec![8u8; len]);
        assert_eq!(&audio[1][..len], &vec![4u8; len][..]);
        assert_eq!(sent[4].1, Packet::StreamStop { duration: None });
    }

    #[test]
    fn test_mode_numbers_probes() {
        let mode = Mode::Mode3200;
        let rig = rig(2);
        rig.mailboxes.send(Role::Encoder, Job::StreamStart { mode, test: true });
        for i in 0..4 {
            rig.mailboxes.send(Role::Encoder, frame(mode, i));
        }
        rig.mailboxes.send(Role::Encoder, Job::StreamStop);
        let sent = finish(rig);

        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(_, p)| p.is_test()));
        let indexes: Vec<i32> = sent[1..3]
            .iter()
            .map(|(_, p)| match p {
                Packet::StreamFrame(FrameBody::Probe { packet_index, duration }) => {
                    assert!(*duration >= 0.0);
                    *packet_index
                }
                p => panic!("unexpected {:?}", p),
            })
            .collect();
        assert_eq!(indexes, vec![1, 2]);
        assert!(matches!(sent[3].1, Packet::StreamStop { duration: Some(_) }));
    }

    #[test]
    fn frames_before_start_are_dropped() {
        let mode = Mode::Mode1600;
        let rig = rig(1);
        rig.mailboxes.send(Role::Encoder, frame(mode, 1));
        rig.mailboxes.send(Role::Encoder, Job::StreamStop);
        rig.mailboxes.send(Role::Encoder, Job::StreamStart { mode, test: false });
        rig.mailboxes.send(Role::Encoder, frame(mode, 2));
        let sent = finish(rig);

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, PacketKind::StreamStart);
        assert_eq!(sent[1].1, Packet::StreamFrame(FrameBody::Audio(vec![2u8; 8])));
    }

    #[test]
    fn packet_index_wraps() {
        let mode = Mode::Mode3200;
        let (mailboxes, receivers) = Mailboxes::new();
        let (sink, _collector) = stat_channel();
        let serial_rx = receivers[0].1.clone();
        let ctx = Context::new(Role::Encoder, receivers[1].1.clone(), mailboxes, sink);
        let mut worker = EncoderWorker::new(Arc::new(FakeVocoders), 1);

        worker.stream_start(&ctx, mode, true).unwrap();
        if let Some(stream) = worker.stream.as_mut() {
            stream.packet_index = i32::MAX;
        }
        worker.stream_frame(&ctx, &vec![0; mode.samples_per_frame()]).unwrap();

        let indexes: Vec<i32> = serial_rx
            .try_iter()
            .filter_map(|job| match job {
                Job::Send { bytes, .. } => {
                    let mut reader = PacketReader::new();
                    reader.extend(&bytes);
                    reader.packets().next()
                }
                _ => None,
            })
            .filter_map(|p| match p {
                Ok(Packet::StreamFrame(FrameBody::Probe { packet_index, .. })) => {
                    Some(packet_index)
                }
                _ => None,
            })
            .collect();
        assert_eq!(indexes, vec![i32::MIN]);
    }

    #[test]
    fn oversized_chunking_is_fatal() {
        // 40 frames of 7 bytes cannot fit one payload
        let mode = Mode::Mode1300;
        let rig = rig(40);
        rig.mailboxes.send(Role::Encoder, Job::StreamStart { mode, test: false });
        for i in 0..40 {
            rig.mailboxes.send(Role::Encoder, frame(mode, i));
        }
        // the encoder dies and cascades Stop without being asked
        let mut saw_stop = false;
        while let Ok(job) = rig.serial_rx.recv_timeout(Duration::from_secs(2)) {
            if job == Job::Stop {
                saw_stop = true;
                break;
            }
        }
        assert!(saw_stop);
        rig.handle.join();
    }
}
