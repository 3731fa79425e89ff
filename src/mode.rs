use std::fmt;

/// Vocoder operating point.
///
/// The discriminant is the wire code carried by STREAM_START.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    Mode700 = 1,
    Mode1200 = 2,
    Mode1300 = 3,
    Mode1400 = 4,
    Mode1600 = 5,
    Mode2400 = 6,
    Mode3200 = 7,
}

pub const ALL_MODES: [Mode; 7] = [
    Mode::Mode700,
    Mode::Mode1200,
    Mode::Mode1300,
    Mode::Mode1400,
    Mode::Mode1600,
    Mode::Mode2400,
    Mode::Mode3200,
];

// Indexed by wire code; slot 0 is unused.
const BY_CODE: [Option<Mode>; 8] = [
    None,
    Some(Mode::Mode700),
    Some(Mode::Mode1200),
    Some(Mode::Mode1300),
    Some(Mode::Mode1400),
    Some(Mode::Mode1600),
    Some(Mode::Mode2400),
    Some(Mode::Mode3200),
];

impl Mode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Bitrate in bits per second.
    pub fn rate(self) -> u32 {
        match self {
            Mode::Mode700 => 700,
            Mode::Mode1200 => 1200,
            Mode::Mode1300 => 1300,
            Mode::Mode1400 => 1400,
            Mode::Mode1600 => 1600,
            Mode::Mode2400 => 2400,
            Mode::Mode3200 => 3200,
        }
    }

    /// Bytes of one compressed frame.
    pub fn encoded_len(self) -> usize {
        match self {
            Mode::Mode700 => 4,
            Mode::Mode1200 => 6,
            Mode::Mode1300 => 7,
            Mode::Mode1400 => 7,
            Mode::Mode1600 => 8,
            Mode::Mode2400 => 6,
            Mode::Mode3200 => 8,
        }
    }

    /// Raw 16-bit samples consumed per compressed frame.
    pub fn samples_per_frame(self) -> usize {
        match self {
            Mode::Mode2400 | Mode::Mode3200 => 160,
            _ => 320,
        }
    }

    /// Lookup by wire code. Bad wire bytes are expected input, so this
    /// returns `None` instead of failing.
    pub fn from_code(code: u8) -> Option<Mode> {
        BY_CODE.get(code as usize).copied().flatten()
    }

    pub fn from_rate(rate: u32) -> Option<Mode> {
        ALL_MODES.iter().copied().find(|m| m.rate() == rate)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.rate())
    }
}
