use anyhow::{Context as _, Result};
use tracing::{info, warn};

use crate::audio::{AudioInput, StreamGuard};
use crate::job::{Job, Role};
use crate::worker::{Context, Worker};

/// Captures microphone frames while a stream is active.
pub struct RecorderWorker {
    input: Box<dyn AudioInput>,
}

impl RecorderWorker {
    pub fn new(input: Box<dyn AudioInput>) -> Self {
        Self { input }
    }
}

impl Worker for RecorderWorker {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        let mut capture: Option<StreamGuard> = None;
        loop {
            match ctx.next_job() {
                Job::Stop => return Ok(()),
                Job::StreamStart { mode, .. } => {
                    // one capture at a time
                    drop(capture.take());
                    let encoder = ctx.mailbox_of(Role::Encoder);
                    let guard = self
                        .input
                        .open(
                            mode.samples_per_frame(),
                            Box::new(move |samples| {
                                let _ = encoder.send(Job::StreamFrame { samples });
                            }),
                        )
                        .context("opening audio input")?;
                    info!("capturing {} samples per frame", mode.samples_per_frame());
                    capture = Some(guard);
                }
                Job::StreamStop => {
                    if capture.take().is_some() {
                        info!("capture stopped");
                    }
                }
                other => warn!("ignoring {:?}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Mailboxes;
    use crate::mode::Mode;
    use crate::stats::stat_channel;
    use crate::testing::ScriptedInput;
    use crate::worker::spawn;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn forwards_frames_between_start_and_stop() {
        let (mailboxes, receivers) = Mailboxes::new();
        let (sink, _collector) = stat_channel();
        let encoder_rx = receivers[1].1.clone();
        let ctx = Context::new(Role::Recorder, receivers[4].1.clone(), mailboxes.clone(), sink);
        let input = ScriptedInput {
            frames: 3,
            ..Default::default()
        };
        let handle = spawn(RecorderWorker::new(Box::new(input.clone())), ctx).unwrap();

        let mode = Mode::Mode2400;
        mailboxes.send(Role::Recorder, Job::StreamStart { mode, test: false });
        for i in 0..3 {
            let job = encoder_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(
                job,
                Job::StreamFrame {
                    samples: vec![i; mode.samples_per_frame()]
                }
            );
        }
        mailboxes.send(Role::Recorder, Job::StreamStop);
        mailboxes.send(Role::Recorder, Job::Stop);
        handle.join();

        assert_eq!(input.opened.load(Ordering::Relaxed), 1);
        assert_eq!(input.closed.load(Ordering::Relaxed), 1);
    }
}
