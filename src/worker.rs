//! Common run loop for the pipeline workers.
//!
//! A worker goes `Starting -> Running -> Draining -> Stopped`. Whatever ends
//! its `run` (a `Stop` job, an error, a panic) it sends `Stop` to every
//! mailbox on the way out, so one worker ending takes the whole pipeline down.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context as _, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{error, info, info_span};

use crate::job::{Job, Mailboxes, Role};
use crate::stats::{Stat, StatSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}

/// What a worker gets to talk to the rest of the pipeline.
pub struct Context {
    pub role: Role,
    mailbox: Receiver<Job>,
    peers: Mailboxes,
    stats: StatSink,
}

impl Context {
    pub fn new(role: Role, mailbox: Receiver<Job>, peers: Mailboxes, stats: StatSink) -> Self {
        Self {
            role,
            mailbox,
            peers,
            stats,
        }
    }

    /// Block for the next job. A dead mailbox reads as `Stop`.
    pub fn next_job(&self) -> Job {
        self.mailbox.recv().unwrap_or(Job::Stop)
    }

    pub fn try_next_job(&self) -> Option<Job> {
        match self.mailbox.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Job::Stop),
        }
    }

    pub fn send(&self, role: Role, job: Job) {
        self.peers.send(role, job);
    }

    /// Sender for handing to callbacks that outlive a borrow of `self`.
    pub fn mailbox_of(&self, role: Role) -> Sender<Job> {
        self.peers.sender(role)
    }

    pub fn push_stat(&self, stat: Stat) {
        self.stats.push(stat);
    }
}

pub trait Worker: Send + 'static {
    /// Service the mailbox until `Stop`. Errors end the pipeline.
    fn run(&mut self, ctx: &Context) -> Result<()>;
}

impl Worker for Box<dyn Worker> {
    fn run(&mut self, ctx: &Context) -> Result<()> {
        (**self).run(ctx)
    }
}

pub struct WorkerHandle {
    role: Role,
    state: Arc<AtomicU8>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            error!(role = %self.role, "worker thread panicked");
        }
    }
}

// Runs on every exit path, unwinding included.
struct Cascade<'a> {
    ctx: &'a Context,
    state: &'a AtomicU8,
}

impl Drop for Cascade<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("panicked");
        }
        self.state
            .store(WorkerState::Draining as u8, Ordering::Release);
        self.ctx.peers.broadcast_stop();
        self.state.store(WorkerState::Stopped as u8, Ordering::Release);
        info!("finished");
    }
}

pub fn spawn<W: Worker>(mut worker: W, ctx: Context) -> Result<WorkerHandle> {
    let role = ctx.role;
    let state = Arc::new(AtomicU8::new(WorkerState::Starting as u8));
    let thread_state = state.clone();

    let thread = thread::Builder::new()
        .name(format!("loradio-{}", role))
        .spawn(move || {
            let _span = info_span!("worker", role = %ctx.role).entered();
            let _cascade = Cascade {
                ctx: &ctx,
                state: &thread_state,
            };
            thread_state.store(WorkerState::Running as u8, Ordering::Release);
            info!("started");
            match worker.run(&ctx) {
                Ok(()) => info!("stopping"),
                Err(e) => error!("ERROR: {:#}", e),
            }
        })
        .with_context(|| format!("spawning {} worker", role))?;

    Ok(WorkerHandle {
        role,
        state,
        thread,
    })
}
