use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use crossbeam_channel::{Receiver, select, tick, unbounded};
use tracing::{info, warn};

use crate::audio::{AudioInput, AudioOutput};
use crate::cli::{Control, RunOpts};
use crate::config::Config;
use crate::mode::{ALL_MODES, Mode};
use crate::pipeline::{Devices, Pipeline};
use crate::port::open_port;
use crate::vocoder::{Codec2Factory, VocoderFactory};

const WATCHDOG: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum Next {
    Continue,
    Quit,
    Died,
}

pub fn run(opts: RunOpts) -> Result<()> {
    info!("run: {:?}", opts);
    let config = load_config(&opts)?;
    let mode = config.mode()?;

    let link = open_port(&opts.ser)?;
    let (input, output) = audio_devices(&config);
    let devices = Devices {
        link: Box::new(link),
        vocoders: Arc::new(Codec2Factory),
        input,
        output,
    };
    let mut pipeline = Pipeline::start(&config, devices)?;
    if opts.start {
        pipeline.stream_start(mode, opts.test)?;
    }

    let controls = read_stdin()?;
    let ticker = tick(stats_period(opts.stats));
    let watchdog = tick(WATCHDOG);
    info!("commands: start [rate] | test [rate] | stop | stats | quit");

    let end = loop {
        let next = select! {
            recv(controls) -> line => match line {
                Ok(line) => handle_line(&mut pipeline, mode, &line),
                Err(_) => Next::Quit,
            },
            recv(ticker) -> _ => {
                print_stats(&mut pipeline);
                Next::Continue
            },
            recv(watchdog) -> _ => {
                if pipeline.is_running() { Next::Continue } else { Next::Died }
            },
        };
        match next {
            Next::Continue => {}
            end => break end,
        }
    };

    print_stats(&mut pipeline);
    pipeline.stop();
    if !pipeline.wait(SHUTDOWN_GRACE) {
        warn!("workers still busy after {:?}, joining anyway", SHUTDOWN_GRACE);
    }
    pipeline.shutdown();
    if let Next::Died = end {
        bail!("pipeline stopped");
    }
    Ok(())
}

pub fn modes() {
    println!(
        "{:>4}  {:>8}  {:>11}  {:>13}  {}",
        "code", "rate", "bytes/frame", "samples/frame", "vocoder"
    );
    for mode in ALL_MODES {
        println!(
            "{:>4}  {:>8}  {:>11}  {:>13}  {}",
            mode.code(),
            mode.to_string(),
            mode.encoded_len(),
            mode.samples_per_frame(),
            if Codec2Factory.supports(mode) {
                "codec2"
            } else {
                "unsupported"
            }
        );
    }
}

/// Stats ticker period, kept within 0.1 s to 1 h.
fn stats_period(secs: f64) -> Duration {
    let secs = if secs.is_nan() {
        1.0
    } else {
        secs.clamp(0.1, 3600.0)
    };
    Duration::from_secs_f64(secs)
}

fn load_config(opts: &RunOpts) -> Result<Config> {
    let mut config = Config::load(opts.config.as_deref())?;
    apply_overrides(&mut config, opts);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, opts: &RunOpts) {
    if let Some(mode) = opts.mode {
        config.vocoder.mode = mode;
    }
    if let Some(chunks) = opts.chunks {
        config.vocoder.chunks = chunks;
    }
    if let Some(poll_ms) = opts.poll_ms {
        config.serial.poll_ms = poll_ms;
    }
}

#[cfg(feature = "audio")]
fn audio_devices(config: &Config) -> (Box<dyn AudioInput>, Box<dyn AudioOutput>) {
    use crate::audio::device::{Microphone, Speaker};
    (
        Box::new(Microphone {
            sound_rate: config.vocoder.sound_rate,
        }),
        Box::new(Speaker {
            sound_rate: config.vocoder.sound_rate,
            frames_per_buffer: config.vocoder.frames_per_buffer,
        }),
    )
}

#[cfg(not(feature = "audio"))]
fn audio_devices(config: &Config) -> (Box<dyn AudioInput>, Box<dyn AudioOutput>) {
    use crate::audio::null::{Discard, Silence};
    warn!("built without the audio feature: capturing silence, discarding playback");
    (
        Box::new(Silence {
            sound_rate: config.vocoder.sound_rate,
        }),
        Box::new(Discard {
            sound_rate: config.vocoder.sound_rate,
            frames_per_buffer: config.vocoder.frames_per_buffer as usize,
        }),
    )
}

/// Lines from stdin; the channel closes on EOF.
fn read_stdin() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("loradio-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(rx)
}

fn handle_line(pipeline: &mut Pipeline, default_mode: Mode, line: &str) -> Next {
    if line.trim().is_empty() {
        return Next::Continue;
    }
    match Control::parse(line) {
        Ok(Control::Start { mode, test }) => {
            if let Err(e) = pipeline.stream_start(mode.unwrap_or(default_mode), test) {
                warn!("{:#}", e);
            }
        }
        Ok(Control::Stop) => pipeline.stream_stop(),
        Ok(Control::Stats) => print_stats(pipeline),
        Ok(Control::Quit) => return Next::Quit,
        Err(e) => warn!("{:#}", e),
    }
    Next::Continue
}

fn print_stats(pipeline: &mut Pipeline) {
    for stat in pipeline.stats().values() {
        info!("{}", stat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Cmd};
    use clap::Parser;

    fn run_opts(args: &[&str]) -> RunOpts {
        let argv = ["loradio", "run"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().cmd {
            Cmd::Run(opts) => opts,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let opts = run_opts(&["--mode", "2400", "--chunks", "12", "--poll-ms", "25"]);
        let config = load_config(&opts).unwrap();
        assert_eq!(config.mode().unwrap(), Mode::Mode2400);
        assert_eq!(config.vocoder.chunks, 12);
        assert_eq!(config.serial.poll_delay(), Duration::from_millis(25));
    }

    #[test]
    fn no_flags_keeps_defaults() {
        let config = load_config(&run_opts(&[])).unwrap();
        assert_eq!(config.mode().unwrap(), Mode::Mode1300);
        assert_eq!(config.vocoder.chunks, 4);
    }

    #[test]
    fn stats_period_is_bounded() {
        assert_eq!(stats_period(1.0), Duration::from_secs(1));
        assert_eq!(stats_period(0.0), Duration::from_millis(100));
        assert_eq!(stats_period(-5.0), Duration::from_millis(100));
        assert_eq!(stats_period(f64::INFINITY), Duration::from_secs(3600));
        assert_eq!(stats_period(f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn invalid_override_fails_fast() {
        assert!(load_config(&run_opts(&["--mode", "3200", "--chunks", "40"])).is_err());
        assert!(load_config(&run_opts(&["--mode", "1234"])).is_err());
    }
}
