use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use tracing::{debug, warn};

use crate::job::{Job, Role};
use crate::packet::PacketKind;
use crate::port::Link;
use crate::stats::{SerialStat, Stat, bytes_per_second};
use crate::worker::{Context, Worker};

/// Owns the link: one poll loop services both directions.
pub struct SerialWorker {
    link: Box<dyn Link>,
    poll: Duration,
    stat: SerialStat,
    tx_started: Option<Instant>,
}

impl SerialWorker {
    pub fn new(link: Box<dyn Link>, poll: Duration) -> Self {
        Self {
            link,
            poll,
            stat: SerialStat::default(),
            tx_started: None,
        }
    }

    fn receive(&mut self, ctx: &Context) -> Result<()> {
        let mut bytes = Vec::new();
        let n = self.link.read_available(&mut bytes).context("serial read")?;
        if n > 0 {
            debug!("got {} bytes", n);
            self.stat.rx_total += n as u64;
            ctx.send(Role::Decoder, Job::Recv { bytes });
            ctx.push_stat(Stat::Serial(self.stat.clone()));
        }
        Ok(())
    }

    fn transmit(&mut self, kind: PacketKind, bytes: &[u8]) -> Result<()> {
        if kind == PacketKind::StreamStart {
            self.tx_started = Some(Instant::now());
            self.stat.tx_current = Some(0);
        }
        debug!("sending {} bytes", bytes.len());
        self.link.write_bytes(bytes).context("serial write")?;

        let len = bytes.len() as u64;
        let current = self.stat.tx_current.unwrap_or(0) + len;
        self.stat.tx_total += len;
        self.stat.tx_current = Some(current);
        self.stat.tx_duration = self.tx_started.map(|t| t.elapsed().as_secs_f64());
        self.stat.tx_speed = self
            .stat
            .tx_duration
            .and_then(|d| bytes_per_second(current, d));
        Ok(())
    }
}

impl Worker for SerialWorker {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        loop {
            std::thread::sleep(self.poll);

            self.receive(ctx)?;

            match ctx.try_next_job() {
                None => {}
                Some(Job::Stop) => return Ok(()),
                Some(Job::Send { kind, bytes }) => {
                    self.transmit(kind, &bytes)?;
                    ctx.push_stat(Stat::Serial(self.stat.clone()));
                }
                Some(other) => warn!("ignoring {:?}", other),
            }
        }
    }
}
