use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand};

use crate::mode::Mode;

#[derive(Parser, Debug, Clone)]
#[command(name = "loradio", about = "Codec2 voice over a LoRa serial modem")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Open the modem and run the voice pipeline
    Run(RunOpts),
    /// List the supported vocoder modes
    Modes,
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// TOML file with [vocoder] and [serial] tables
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Vocoder bitrate, overrides the config file
    #[arg(long)]
    pub mode: Option<u32>,
    /// Encoded frames per packet, overrides the config file
    #[arg(long)]
    pub chunks: Option<usize>,
    /// Serial poll delay in milliseconds, overrides the config file
    #[arg(long)]
    pub poll_ms: Option<u64>,
    /// Start streaming right away
    #[arg(long, default_value_t = false)]
    pub start: bool,
    /// With --start, send test probes instead of voice
    #[arg(long, default_value_t = false)]
    pub test: bool,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

/// One line typed on stdin while `run` is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start { mode: Option<Mode>, test: bool },
    Stop,
    Stats,
    Quit,
}

impl Control {
    /// `start [rate]`, `test [rate]`, `stop`, `stats` or `quit`.
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            bail!("empty command");
        };
        let control = match cmd.to_ascii_lowercase().as_str() {
            c @ ("start" | "test") => {
                let mode = words.next().map(parse_rate).transpose()?;
                Control::Start {
                    mode,
                    test: c == "test",
                }
            }
            "stop" => Control::Stop,
            "stats" => Control::Stats,
            "quit" | "exit" => Control::Quit,
            other => bail!("unknown command '{}'", other),
        };
        if let Some(extra) = words.next() {
            bail!("unexpected '{}'", extra);
        }
        Ok(control)
    }
}

fn parse_rate(word: &str) -> anyhow::Result<Mode> {
    let rate: u32 = word
        .trim_end_matches("bps")
        .parse()
        .map_err(|_| anyhow!("mode must be a bitrate, got '{}'", word))?;
    Mode::from_rate(rate).ok_or_else(|| anyhow!("unknown mode {}bps", rate))
}
