use anyhow::{Context as _, Result};
use tracing::{debug, warn};

use crate::audio::{AudioOutput, SampleQueue};
use crate::job::Job;
use crate::worker::{Context, Worker};

/// Feeds decoded samples to the speaker through a FIFO.
pub struct PlayerWorker {
    output: Box<dyn AudioOutput>,
    queue: SampleQueue,
}

impl PlayerWorker {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            queue: SampleQueue::new(),
        }
    }
}

impl Worker for PlayerWorker {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        let _playback = self
            .output
            .open(self.queue.clone())
            .context("opening audio output")?;
        loop {
            match ctx.next_job() {
                Job::Stop => {
                    if !self.queue.is_empty() {
                        debug!("{} samples left unplayed", self.queue.len());
                    }
                    return Ok(());
                }
                Job::Play { samples } => self.queue.push(&samples),
                other => warn!("ignoring {:?}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Mailboxes, Role};
    use crate::stats::stat_channel;
    use crate::testing::HeldOutput;
    use crate::worker::spawn;

    #[test]
    fn queues_play_jobs_in_order() {
        let (mailboxes, receivers) = Mailboxes::new();
        let (sink, _collector) = stat_channel();
        let ctx = Context::new(Role::Player, receivers[3].1.clone(), mailboxes.clone(), sink);
        let output = HeldOutput::default();
        let handle = spawn(PlayerWorker::new(Box::new(output.clone())), ctx).unwrap();

        mailboxes.send(Role::Player, Job::Play { samples: vec![1, 2] });
        mailboxes.send(Role::Player, Job::Play { samples: vec![3] });
        mailboxes.send(Role::Player, Job::Stop);
        handle.join();

        assert_eq!(output.samples(), vec![1, 2, 3]);
    }
}
