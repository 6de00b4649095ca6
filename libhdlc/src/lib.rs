//! Software HDLC codec for ISDN channels on hardware without an HDLC
//! controller.
//!
//! The [`Decoder`] turns a raw bitstream (as delivered by the line driver,
//! octet by octet) into frames, checking flags, bit-stuffing and the CRC-16
//! frame check sequence. The [`Encoder`] does the inverse. Both keep their
//! complete state across calls, so a bitstream can be fed in fragments of any
//! size.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod codec;
pub mod consts;
pub mod crc;
pub mod decoder;
pub mod encoder;

pub use codec::Codec;
pub use decoder::Decoder;
pub use encoder::{Encoded, Encoder};


/// Line configuration, fixed when a channel is activated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// 56 kbit/s rate adaptation: only the upper seven bits of each octet
    /// carry HDLC data, the lowest bit is always one.
    pub adapt56: bool,

    /// D-channel operation: all-ones idle between frames instead of flags.
    pub d_channel: bool,

    /// Line octets carry their first bit in the LSB instead of the MSB.
    pub bit_reversed: bool,
}

impl Config {
    pub fn d_channel() -> Self {
        Self { d_channel: true, ..Self::default() }
    }

    pub fn b_channel() -> Self {
        Self::default()
    }

    /// Number of HDLC bits carried by one line octet.
    pub fn bits_per_octet(&self) -> u8 {
        if self.adapt56 { 7 } else { 8 }
    }
}


/// Per-frame decoding errors. None of these is fatal, the decoder
/// resynchronizes on the next flag.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum FrameError {
    /// Frame too short, not octet aligned, or aborted after data.
    Framing = 1,

    /// Frame check sequence mismatch.
    Crc = 2,

    /// Frame does not fit into the destination buffer.
    Length = 3,
}

impl FrameError {
    pub fn description(&self) -> &'static str {
        match self {
            FrameError::Framing => "framing error",
            FrameError::Crc => "frame check sequence mismatch",
            FrameError::Length => "frame exceeds destination buffer",
        }
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for FrameError {}


/// Outcome of a [`Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// All input consumed, no frame completed yet.
    Pending,

    /// A frame with the given payload length (FCS stripped) is in the
    /// destination buffer.
    Frame(usize),

    /// The frame in progress was discarded.
    Error(FrameError),
}

impl Status {
    /// Signed status code: `0` for pending, the payload length for a frame,
    /// or the negated [`FrameError`] code.
    ///
    /// Note that a frame with an empty payload also maps to `0`.
    pub fn code(&self) -> isize {
        match *self {
            Status::Pending => 0,
            Status::Frame(len) => len as isize,
            Status::Error(err) => -(u8::from(err) as isize),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }
}
