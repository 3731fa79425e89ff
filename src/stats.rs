use std::collections::BTreeMap;
use std::fmt;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::job::Role;
use crate::mode::Mode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerialStat {
    pub rx_total: u64,
    pub tx_total: u64,
    /// Seconds since the current stream's STREAM_START went out.
    pub tx_duration: Option<f64>,
    pub tx_current: Option<u64>,
    /// Bytes per second over the current stream.
    pub tx_speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderStat {
    pub tx_packets: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderStat {
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_duration: f64,
    pub rx_mode: Option<Mode>,
    pub rx_current: Option<u64>,
    /// Bits per second over the current stream.
    pub rx_speed: Option<f64>,
    pub rx_delay: Option<f64>,
    pub rx_lost: Option<u64>,
}

/// Point-in-time copy of one worker's counters.
#[derive(Debug, Clone, PartialEq)]
pub enum Stat {
    Serial(SerialStat),
    Encoder(EncoderStat),
    Decoder(DecoderStat),
}

impl Stat {
    pub fn role(&self) -> Role {
        match self {
            Stat::Serial(_) => Role::Serial,
            Stat::Encoder(_) => Role::Encoder,
            Stat::Decoder(_) => Role::Decoder,
        }
    }
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn opt_f(v: Option<f64>, prec: usize) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.*}", prec, v))
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stat::Serial(s) => write!(
                f,
                "[serial] rx_total={} tx_total={} tx_current={} over {}s => {} B/s",
                s.rx_total,
                s.tx_total,
                opt(&s.tx_current),
                opt_f(s.tx_duration, 1),
                opt_f(s.tx_speed, 1),
            ),
            Stat::Encoder(s) => write!(f, "[encoder] tx_packets={}", s.tx_packets),
            Stat::Decoder(s) => write!(
                f,
                "[decoder] mode={} packets={} errors={} current={} over {:.1}s => {} bps delay={}s lost={}",
                opt(&s.rx_mode),
                s.rx_packets,
                s.rx_errors,
                opt(&s.rx_current),
                s.rx_duration,
                opt_f(s.rx_speed, 0),
                opt_f(s.rx_delay, 3),
                opt(&s.rx_lost),
            ),
        }
    }
}

/// `None` until some time has elapsed.
pub fn bytes_per_second(bytes: u64, secs: f64) -> Option<f64> {
    (secs > 0.0).then(|| bytes as f64 / secs)
}

pub fn bits_per_second(bytes: u64, secs: f64) -> Option<f64> {
    bytes_per_second(bytes, secs).map(|b| b * 8.0)
}

/// Producer side of the shared stat feed; one clone per worker.
#[derive(Debug, Clone)]
pub struct StatSink {
    tx: Sender<Stat>,
}

impl StatSink {
    pub fn push(&self, stat: Stat) {
        let _ = self.tx.send(stat);
    }
}

/// Keeps the latest snapshot per role.
#[derive(Debug)]
pub struct StatCollector {
    rx: Receiver<Stat>,
    latest: BTreeMap<Role, Stat>,
}

pub fn stat_channel() -> (StatSink, StatCollector) {
    let (tx, rx) = unbounded();
    (
        StatSink { tx },
        StatCollector {
            rx,
            latest: BTreeMap::new(),
        },
    )
}

impl StatCollector {
    /// Take everything queued without blocking; last snapshot wins.
    pub fn drain(&mut self) -> &BTreeMap<Role, Stat> {
        for stat in self.rx.try_iter() {
            self.latest.insert(stat.role(), stat);
        }
        &self.latest
    }
}
