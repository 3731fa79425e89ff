//! Owns the five workers and their mailboxes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info};

use crate::audio::{AudioInput, AudioOutput, Cues};
use crate::config::Config;
use crate::decoder::DecoderWorker;
use crate::encoder::EncoderWorker;
use crate::job::{Job, Mailboxes, Role};
use crate::mode::Mode;
use crate::player::PlayerWorker;
use crate::port::Link;
use crate::recorder::RecorderWorker;
use crate::serial::SerialWorker;
use crate::stats::{Stat, StatCollector, stat_channel};
use crate::vocoder::VocoderFactory;
use crate::worker::{Context, Worker, WorkerHandle, WorkerState, spawn};

/// External capabilities the workers are built on.
pub struct Devices {
    pub link: Box<dyn Link>,
    pub vocoders: Arc<dyn VocoderFactory>,
    pub input: Box<dyn AudioInput>,
    pub output: Box<dyn AudioOutput>,
}

pub struct Pipeline {
    config: Config,
    vocoders: Arc<dyn VocoderFactory>,
    mailboxes: Mailboxes,
    workers: Vec<WorkerHandle>,
    stats: StatCollector,
}

impl Pipeline {
    /// Spawn every worker, or none: a failed spawn stops the ones already up.
    pub fn start(config: &Config, devices: Devices) -> Result<Self> {
        let (mailboxes, receivers) = Mailboxes::new();
        let mut receivers: BTreeMap<Role, _> = receivers.into_iter().collect();
        let (sink, stats) = stat_channel();

        let Devices {
            link,
            vocoders,
            input,
            output,
        } = devices;
        let mode = config.mode()?;
        if !vocoders.supports(mode) {
            bail!("no vocoder for configured mode {}", mode);
        }
        let cues = Cues::new(config.vocoder.sound_rate);
        let plan: [(Role, Box<dyn Worker>); 5] = [
            (Role::Recorder, Box::new(RecorderWorker::new(input))),
            (Role::Player, Box::new(PlayerWorker::new(output))),
            (
                Role::Decoder,
                Box::new(DecoderWorker::new(vocoders.clone(), cues)),
            ),
            (
                Role::Encoder,
                Box::new(EncoderWorker::new(vocoders.clone(), config.vocoder.chunks)),
            ),
            (
                Role::Serial,
                Box::new(SerialWorker::new(link, config.serial.poll_delay())),
            ),
        ];

        let mut workers = Vec::with_capacity(plan.len());
        for (role, worker) in plan {
            let spawned = receivers
                .remove(&role)
                .ok_or_else(|| anyhow!("no mailbox for {}", role))
                .and_then(|rx| {
                    let ctx = Context::new(role, rx, mailboxes.clone(), sink.clone());
                    spawn(worker, ctx)
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    mailboxes.broadcast_stop();
                    for handle in workers {
                        handle.join();
                    }
                    return Err(e);
                }
            }
        }
        info!("pipeline started");

        Ok(Self {
            config: config.clone(),
            vocoders,
            mailboxes,
            workers,
            stats,
        })
    }

    /// Ask every worker to stop. Returns immediately.
    pub fn stop(&self) {
        self.mailboxes.broadcast_stop();
    }

    pub fn stream_start(&self, mode: Mode, test: bool) -> Result<()> {
        self.config.check_mode(mode)?;
        if !self.vocoders.supports(mode) {
            bail!("no vocoder for {}", mode);
        }
        info!("starting {} stream, test: {}", mode, test);
        // encoder first so it has a stream before the first frame lands
        self.mailboxes
            .send(Role::Encoder, Job::StreamStart { mode, test });
        self.mailboxes
            .send(Role::Recorder, Job::StreamStart { mode, test });
        Ok(())
    }

    pub fn stream_stop(&self) {
        info!("stopping stream");
        self.mailboxes.send(Role::Recorder, Job::StreamStop);
        self.mailboxes.send(Role::Encoder, Job::StreamStop);
    }

    /// Latest snapshot per role.
    pub fn stats(&mut self) -> &BTreeMap<Role, Stat> {
        self.stats.drain()
    }

    /// True until any worker starts winding down.
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .iter()
                .all(|w| matches!(w.state(), WorkerState::Starting | WorkerState::Running))
    }

    /// Wait for every worker to exit. False if `timeout` ran out first.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.workers.iter().all(|w| w.is_finished()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stop and join every worker.
    pub fn shutdown(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        self.stop();
        for handle in self.workers.drain(..) {
            debug!("joining {}", handle.role());
            handle.join();
        }
    }

    #[cfg(test)]
    fn send(&self, role: Role, job: Job) {
        self.mailboxes.send(role, job);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.join_all();
    }
}
