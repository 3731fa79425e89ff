//! Wire framing for the radio link.
//!
//! ```text
//! MAGIC_WORD (6) | size (1) | payload (size)
//! payload = flags (1) | body
//! flags   = kind (low 7 bits) | TEST (bit 7)
//! ```
//!
//! Multi-byte fields are little-endian.

use thiserror::Error;

use crate::mode::Mode;

pub const MAGIC_WORD: &[u8; 6] = b"PaCkEt";
pub const MAX_PAYLOAD: usize = 255;

const TEST_FLAG: u8 = 1 << 7;
const DURATION_SIZE: usize = 4;
const INDEX_SIZE: usize = 4;
const HEADER_SIZE: usize = MAGIC_WORD.len() + 1;

#[derive(Debug, Error, PartialEq)]
pub enum PacketError {
    #[error("payload of {0} bytes exceeds 255")]
    PayloadTooLarge(usize),
    #[error("empty payload")]
    Empty,
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("unknown mode code {0}")]
    UnknownMode(u8),
    #[error("truncated {kind:?}: need {need} bytes, got {got}")]
    Truncated {
        kind: PacketKind,
        need: usize,
        got: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    StreamStart = 1,
    StreamStop = 2,
    StreamFrame = 3,
}

impl PacketKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PacketKind::StreamStart),
            2 => Some(PacketKind::StreamStop),
            3 => Some(PacketKind::StreamFrame),
            _ => None,
        }
    }

    fn flags(self, test: bool) -> u8 {
        self.code() | if test { TEST_FLAG } else { 0 }
    }
}

/// Body of a STREAM_FRAME.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Concatenated compressed frames.
    Audio(Vec<u8>),
    /// Test-mode probe; padding is not kept.
    Probe { duration: f32, packet_index: i32 },
}

/// A decoded packet. The test flag is implied by the variant contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    StreamStart { test: bool, mode: Mode },
    StreamFrame(FrameBody),
    /// `duration` is present only in test mode.
    StreamStop { duration: Option<f32> },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::StreamStart { .. } => PacketKind::StreamStart,
            Packet::StreamFrame(_) => PacketKind::StreamFrame,
            Packet::StreamStop { .. } => PacketKind::StreamStop,
        }
    }

    pub fn is_test(&self) -> bool {
        match self {
            Packet::StreamStart { test, .. } => *test,
            Packet::StreamFrame(body) => matches!(body, FrameBody::Probe { .. }),
            Packet::StreamStop { duration } => duration.is_some(),
        }
    }
}

/// Wrap a payload with the sync header.
pub fn encode_payload(payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(MAGIC_WORD);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn encode_stream_start(test: bool, mode: Mode) -> Result<Vec<u8>, PacketError> {
    encode_payload(&[PacketKind::StreamStart.flags(test), mode.code()])
}

/// In test mode `data` only sets the padded length, so probes occupy the
/// same airtime as the audio they replace.
pub fn encode_stream_frame(
    test: bool,
    data: &[u8],
    duration: f32,
    packet_index: i32,
) -> Result<Vec<u8>, PacketError> {
    let mut payload = Vec::with_capacity(1 + data.len().max(DURATION_SIZE + INDEX_SIZE));
    payload.push(PacketKind::StreamFrame.flags(test));
    if test {
        payload.extend_from_slice(&duration.to_le_bytes());
        payload.extend_from_slice(&packet_index.to_le_bytes());
        let pad = data.len().saturating_sub(DURATION_SIZE + INDEX_SIZE);
        payload.resize(payload.len() + pad, 0);
    } else {
        payload.extend_from_slice(data);
    }
    encode_payload(&payload)
}

pub fn encode_stream_stop(test: bool, duration: f32) -> Result<Vec<u8>, PacketError> {
    let mut payload = vec![PacketKind::StreamStop.flags(test)];
    if test {
        payload.extend_from_slice(&duration.to_le_bytes());
    }
    encode_payload(&payload)
}

fn need(kind: PacketKind, payload: &[u8], n: usize) -> Result<(), PacketError> {
    if payload.len() < n {
        return Err(PacketError::Truncated {
            kind,
            need: n,
            got: payload.len(),
        });
    }
    Ok(())
}

fn read_f32(b: &[u8]) -> f32 {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Decode one payload (without the sync header).
pub fn decode_payload(payload: &[u8]) -> Result<Packet, PacketError> {
    let flags = *payload.first().ok_or(PacketError::Empty)?;
    let test = flags & TEST_FLAG != 0;
    let code = flags & !TEST_FLAG;
    let kind = PacketKind::from_code(code).ok_or(PacketError::UnknownKind(code))?;
    let body = &payload[1..];

    match kind {
        PacketKind::StreamStart => {
            need(kind, payload, 2)?;
            let mode = Mode::from_code(body[0]).ok_or(PacketError::UnknownMode(body[0]))?;
            Ok(Packet::StreamStart { test, mode })
        }
        PacketKind::StreamFrame => {
            if test {
                need(kind, payload, 1 + DURATION_SIZE + INDEX_SIZE)?;
                Ok(Packet::StreamFrame(FrameBody::Probe {
                    duration: read_f32(&body[..DURATION_SIZE]),
                    packet_index: read_i32(&body[DURATION_SIZE..DURATION_SIZE + INDEX_SIZE]),
                }))
            } else {
                Ok(Packet::StreamFrame(FrameBody::Audio(body.to_vec())))
            }
        }
        PacketKind::StreamStop => {
            let duration = if test {
                need(kind, payload, 1 + DURATION_SIZE)?;
                Some(read_f32(&body[..DURATION_SIZE]))
            } else {
                None
            };
            Ok(Packet::StreamStop { duration })
        }
    }
}

/// Reassembles packets from an arbitrarily chunked byte stream.
///
/// Bytes that can no longer start a packet are dropped as soon as that is
/// known, so the buffer never holds more than one partial packet plus the
/// last unconsumed read.
#[derive(Debug, Default)]
pub struct PacketReader {
    buf: Vec<u8>,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete payload, or `None` until more bytes arrive.
    pub fn next_payload(&mut self) -> Option<Vec<u8>> {
        match find_magic(&self.buf) {
            None => {
                // keep a tail that may be the start of a split magic word
                let keep = MAGIC_WORD.len() - 1;
                if self.buf.len() > keep {
                    self.buf.drain(..self.buf.len() - keep);
                }
                return None;
            }
            Some(at) => {
                self.buf.drain(..at);
            }
        }
        if self.buf.len() < HEADER_SIZE {
            return None;
        }
        let size = self.buf[MAGIC_WORD.len()] as usize;
        let end = HEADER_SIZE + size;
        if self.buf.len() < end {
            return None;
        }
        let payload = self.buf[HEADER_SIZE..end].to_vec();
        self.buf.drain(..end);
        Some(payload)
    }

    /// Lazily decode every packet currently buffered.
    pub fn packets(&mut self) -> Packets<'_> {
        Packets { reader: self }
    }
}

pub struct Packets<'a> {
    reader: &'a mut PacketReader,
}

impl Iterator for Packets<'_> {
    type Item = Result<Packet, PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_payload().map(|p| decode_payload(&p))
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC_WORD.len()).position(|w| w == MAGIC_WORD)
}
