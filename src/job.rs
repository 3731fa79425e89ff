use std::fmt;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::mode::Mode;
use crate::packet::PacketKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Serial,
    Encoder,
    Decoder,
    Player,
    Recorder,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Serial,
        Role::Encoder,
        Role::Decoder,
        Role::Player,
        Role::Recorder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Serial => "serial",
            Role::Encoder => "encoder",
            Role::Decoder => "decoder",
            Role::Player => "player",
            Role::Recorder => "recorder",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The only thing ever put on a mailbox. Handed off by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Stop,
    /// Encoded packet bytes for the wire.
    Send { kind: PacketKind, bytes: Vec<u8> },
    /// Bytes read off the wire, in arrival order.
    Recv { bytes: Vec<u8> },
    StreamStart { mode: Mode, test: bool },
    StreamStop,
    StreamFrame { samples: Vec<i16> },
    Play { samples: Vec<i16> },
}

/// Sending half of every worker's mailbox.
#[derive(Debug, Clone)]
pub struct Mailboxes {
    senders: [Sender<Job>; 5],
}

impl Mailboxes {
    /// Create one unbounded mailbox per role; receivers are indexed like `Role::ALL`.
    pub fn new() -> (Self, Vec<(Role, Receiver<Job>)>) {
        let mut receivers = Vec::with_capacity(Role::ALL.len());
        let senders = Role::ALL.map(|role| {
            let (tx, rx) = unbounded();
            receivers.push((role, rx));
            tx
        });
        (Self { senders }, receivers)
    }

    /// Enqueue a job. A mailbox whose worker already exited swallows it.
    pub fn send(&self, role: Role, job: Job) -> bool {
        self.senders[role.index()].send(job).is_ok()
    }

    pub fn sender(&self, role: Role) -> Sender<Job> {
        self.senders[role.index()].clone()
    }

    pub fn broadcast_stop(&self) {
        for tx in &self.senders {
            let _ = tx.send(Job::Stop);
        }
    }
}
