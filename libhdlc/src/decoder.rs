//! Bit-level HDLC decoder.
//!
//! Ones are counted on the fly: up to five ones are data, a zero after five
//! ones is a stuffing bit, six ones followed by a zero form a flag and seven
//! or more ones abort the frame (or mark an idle line). The leading zero and
//! the first five ones of a closing flag cannot be told apart from data until
//! the flag is complete, so they end up in the bit accumulator: a correctly
//! aligned frame ends with exactly six pending bits there.

use super::consts;
use super::crc::Crc16;
use super::{Config, FrameError, Status};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for a flag. `ones` is the length of the current run of ones.
    Hunt { ones: u8 },

    /// Seven or more ones seen, either an abort or an idle line.
    Idle,

    /// A flag has been seen, accumulating a frame.
    Frame(Frame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    ones: u8,
    shift: u8,
    bits: u8,
    len: usize,
    crc: Crc16,
}

impl Frame {
    fn new() -> Self {
        Self {
            ones: 0,
            shift: 0,
            bits: 0,
            len: 0,
            crc: Crc16::new(),
        }
    }

    /// Nothing received since the last flag.
    fn is_empty(&self) -> bool {
        self.ones == 0 && self.bits == 0 && self.len == 0
    }

    fn put_bit(mut self, bit: u8, dst: &mut [u8]) -> (State, Option<Status>) {
        if bit == 1 {
            self.ones += 1;

            if self.ones <= consts::MAX_ONES {
                self.put_data(1, dst)
            } else if self.ones == consts::FLAG_ONES {
                // flag or abort, decided by the next bit
                (State::Frame(self), None)
            } else {
                let status = (self.len > 0).then_some(Status::Error(FrameError::Framing));
                (State::Idle, status)
            }
        } else {
            let ones = std::mem::replace(&mut self.ones, 0);

            if ones == consts::MAX_ONES {
                // stuffing bit
                (State::Frame(self), None)
            } else if ones == consts::FLAG_ONES {
                (State::Frame(Frame::new()), self.close())
            } else {
                self.put_data(0, dst)
            }
        }
    }

    fn put_data(mut self, bit: u8, dst: &mut [u8]) -> (State, Option<Status>) {
        self.shift = (self.shift >> 1) | (bit << 7);
        self.bits += 1;

        if self.bits < 8 {
            return (State::Frame(self), None);
        }

        let byte = self.shift;
        self.shift = 0;
        self.bits = 0;

        let Some(slot) = dst.get_mut(self.len) else {
            tracing::debug!(len = self.len, "frame exceeds destination buffer");
            return (State::Hunt { ones: self.ones }, Some(Status::Error(FrameError::Length)));
        };

        *slot = byte;
        self.len += 1;
        self.crc.put_u8(byte);

        (State::Frame(self), None)
    }

    fn close(&self) -> Option<Status> {
        // back-to-back flags
        if self.len == 0 {
            return None;
        }

        let status = if self.bits != consts::FLAG_ONES || self.len < 2 {
            tracing::debug!(len = self.len, bits = self.bits, "invalid frame");
            Status::Error(FrameError::Framing)
        } else if !self.crc.is_good() {
            tracing::debug!(len = self.len, crc = self.crc.value(), "invalid checksum");
            Status::Error(FrameError::Crc)
        } else {
            Status::Frame(self.len - 2)
        };

        Some(status)
    }
}


/// HDLC decoder for one direction of one channel.
#[derive(Debug, Clone)]
pub struct Decoder {
    config: Config,
    state: State,
    cbin: u8,
    bit_shift: u8,
}

impl Decoder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: State::Hunt { ones: 0 },
            cbin: 0,
            bit_shift: 0,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Drop all state, as on channel deactivation.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Decode a fragment of the bitstream.
    ///
    /// Returns the number of source octets consumed and the decoding status.
    /// Decoding stops at the first frame or frame error; call again with the
    /// remaining input to continue. Bits of a partially processed octet are
    /// kept in the decoder, so the returned count may include an octet that
    /// is not fully processed yet, and a call may report a frame without
    /// consuming anything. [`Status::Pending`] means that all input has been
    /// processed.
    ///
    /// Frame data is assembled in `dst`, which must be the same buffer for
    /// all calls until a status other than [`Status::Pending`] is returned.
    pub fn decode(&mut self, src: &[u8], dst: &mut [u8]) -> (usize, Status) {
        let mut consumed = 0;

        loop {
            if self.bit_shift == 0 {
                let Some(&byte) = src.get(consumed) else {
                    return (consumed, Status::Pending);
                };

                consumed += 1;
                self.load(byte);
                continue;
            }

            let bit = self.cbin >> 7;
            self.cbin <<= 1;
            self.bit_shift -= 1;

            let (state, status) = match self.state {
                State::Hunt { ones } => (hunt(ones, bit), None),
                State::Idle if bit == 1 => (State::Idle, None),
                State::Idle => (State::Hunt { ones: 0 }, None),
                State::Frame(frame) => frame.put_bit(bit, dst),
            };

            self.state = state;

            if let Some(status) = status {
                return (consumed, status);
            }
        }
    }

    fn load(&mut self, byte: u8) {
        let byte = if self.config.bit_reversed {
            consts::BIT_REVERSE[byte as usize]
        } else {
            byte
        };

        let mask = if self.config.adapt56 {
            consts::mask::ADAPT56
        } else {
            consts::mask::FULL
        };

        match self.state {
            // fast idle: skip complete all-ones octets
            State::Idle if byte & mask == mask => return,

            // fast flag: octet-aligned flag right after a flag
            State::Frame(frame) if frame.is_empty() && !self.config.adapt56
                && byte == consts::flags::FRAME => return,

            _ => {},
        }

        self.cbin = byte & mask;
        self.bit_shift = self.config.bits_per_octet();
    }
}


fn hunt(ones: u8, bit: u8) -> State {
    if bit == 1 {
        if ones < consts::FLAG_ONES {
            State::Hunt { ones: ones + 1 }
        } else {
            State::Idle
        }
    } else if ones == consts::FLAG_ONES {
        tracing::trace!("flag found");
        State::Frame(Frame::new())
    } else {
        State::Hunt { ones: 0 }
    }
}
