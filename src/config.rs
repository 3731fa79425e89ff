use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use serde::Deserialize;

use crate::mode::Mode;
use crate::packet::MAX_PAYLOAD;

/// Size of a test-mode probe body (f32 duration + i32 index).
const PROBE_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub vocoder: VocoderConfig,
    pub serial: SerialConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocoderConfig {
    /// Bitrate, one of the rates listed by `loradio modes`.
    pub mode: u32,
    /// Encoded frames per STREAM_FRAME packet.
    pub chunks: usize,
    pub sound_rate: u32,
    pub frames_per_buffer: u32,
}

impl Default for VocoderConfig {
    fn default() -> Self {
        Self {
            mode: 1300,
            chunks: 4,
            sound_rate: 8000,
            frames_per_buffer: 320,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub poll_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { poll_ms: 10 }
    }
}

impl SerialConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl Config {
    /// Read `path` if given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn mode(&self) -> Result<Mode> {
        Mode::from_rate(self.vocoder.mode)
            .ok_or_else(|| anyhow!("unknown mode {}bps", self.vocoder.mode))
    }

    /// Whether `chunks` frames of `mode` fit one packet.
    pub fn check_mode(&self, mode: Mode) -> Result<()> {
        let chunks = self.vocoder.chunks;
        if chunks == 0 {
            bail!("chunks must be at least 1");
        }
        let body = (chunks * mode.encoded_len()).max(PROBE_LEN);
        if 1 + body > MAX_PAYLOAD {
            bail!(
                "{} chunks of {} need a {} byte payload, limit is {}",
                chunks,
                mode,
                1 + body,
                MAX_PAYLOAD
            );
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mode = self.mode()?;
        self.check_mode(mode)?;
        if self.vocoder.sound_rate == 0 {
            bail!("sound_rate must be positive");
        }
        if self.vocoder.frames_per_buffer == 0 {
            bail!("frames_per_buffer must be positive");
        }
        Ok(())
    }
}
