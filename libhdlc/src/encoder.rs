//! Bit-level HDLC encoder.
//!
//! Each call with a non-empty source starts a frame: opening flag (shared
//! with the preceding closing or fill flag where possible), bit-stuffed
//! payload, FCS and closing flag. Between frames, the line is filled with
//! flags on B-channels and with ones on D-channels. On D-channels at least
//! seven ones separate a closing flag from the next opening flag, so the
//! padding after an unaligned closing flag always reads as idle.

use bytes::BytesMut;

use super::consts;
use super::crc::Crc16;
use super::Config;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    Opening,
    Closing,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between frames, no flag sent yet.
    Idle,

    /// Sending a flag, `bit` is the next bit index (MSB first).
    Flag { bit: u8, kind: FlagKind },

    /// A complete flag has been sent, a frame may start right away.
    Flagged,

    /// Sending a payload octet, `bit` is the next bit index (LSB first).
    Data { byte: u8, bit: u8 },

    /// Sending the frame check sequence, low octet first.
    Fcs { fcs: u16, bit: u8 },
}

impl State {
    fn in_frame(&self) -> bool {
        match self {
            State::Data { .. } | State::Fcs { .. } => true,
            State::Flag { kind, .. } => *kind == FlagKind::Closing,
            State::Idle | State::Flagged => false,
        }
    }
}


/// Result of an [`Encoder::encode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    /// Number of source octets consumed.
    pub consumed: usize,

    /// Number of line octets written to the destination.
    pub written: usize,

    /// The frame has been sent completely, including its closing flag.
    /// Always set for filler-only calls.
    pub complete: bool,
}


struct Cursor<'a> {
    src: &'a [u8],
    consumed: usize,
    pending: bool,
    done: bool,
}


/// HDLC encoder for one direction of one channel.
#[derive(Debug, Clone)]
pub struct Encoder {
    config: Config,
    state: State,
    ones: u8,
    idle_ones: u8,
    crc: Crc16,
    out: u8,
    out_bits: u8,
}

impl Encoder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: State::Idle,
            ones: 0,
            idle_ones: consts::IDLE_ONES,
            crc: Crc16::new(),
            out: 0,
            out_bits: 0,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Drop all state, as on channel deactivation.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Encode (part of) a frame into line octets.
    ///
    /// If no frame is in progress, a non-empty `src` starts a new frame.
    /// Otherwise `src` must hold the part of the current frame that has not
    /// been consumed by previous calls. Encoding stops once the frame has been
    /// completed and the output is octet aligned, or when `dst` is full. An
    /// empty `src` without a frame in progress fills all of `dst` with idle
    /// pattern.
    pub fn encode(&mut self, src: &[u8], dst: &mut [u8]) -> Encoded {
        let mut cur = Cursor {
            src,
            consumed: 0,
            pending: !src.is_empty() && !self.state.in_frame(),
            done: false,
        };

        let mut written = 0;

        while written < dst.len() && !(cur.done && self.out_bits == 0) {
            let bit = self.next_bit(&mut cur);

            if let Some(byte) = self.put_bit(bit) {
                dst[written] = byte;
                written += 1;
            }
        }

        Encoded {
            consumed: cur.consumed,
            written,
            complete: !cur.pending && !self.state.in_frame(),
        }
    }

    /// Encode a complete frame, appending the line octets to `dst`.
    pub fn encode_frame(&mut self, payload: &[u8], dst: &mut BytesMut) {
        if payload.is_empty() {
            return;
        }

        let mut buf = [0; 64];
        let mut offset = 0;

        loop {
            let res = self.encode(&payload[offset..], &mut buf);

            offset += res.consumed;
            dst.extend_from_slice(&buf[..res.written]);

            if res.complete {
                break;
            }
        }

        tracing::trace!(len = payload.len(), "frame encoded");
    }

    fn next_bit(&mut self, cur: &mut Cursor<'_>) -> u8 {
        loop {
            if self.ones == consts::MAX_ONES {
                self.ones = 0;
                return 0;
            }

            match self.state {
                State::Idle => {
                    let ready = !self.config.d_channel || self.idle_ones >= consts::IDLE_ONES;

                    if cur.pending && ready {
                        self.state = State::Flag { bit: 0, kind: FlagKind::Opening };
                    } else if self.config.d_channel {
                        self.idle_ones = self.idle_ones.saturating_add(1);
                        return 1;
                    } else {
                        self.state = State::Flag { bit: 0, kind: FlagKind::Fill };
                    }
                },
                State::Flagged => {
                    if cur.pending {
                        cur.pending = false;
                        self.crc = Crc16::new();
                        self.ones = 0;
                        self.next_data(cur);
                    } else if self.config.d_channel {
                        self.idle_ones = 0;
                        self.state = State::Idle;
                    } else {
                        self.state = State::Flag { bit: 0, kind: FlagKind::Fill };
                    }
                },
                State::Flag { bit, kind } => {
                    self.ones = 0;

                    self.state = if bit < 7 {
                        State::Flag { bit: bit + 1, kind }
                    } else {
                        cur.done |= kind == FlagKind::Closing;
                        State::Flagged
                    };

                    return (consts::flags::FRAME >> (7 - bit)) & 1;
                },
                State::Data { byte, bit } => {
                    if bit < 7 {
                        self.state = State::Data { byte, bit: bit + 1 };
                    } else {
                        self.next_data(cur);
                    }

                    return self.count((byte >> bit) & 1);
                },
                State::Fcs { fcs, bit } => {
                    self.state = if bit < 15 {
                        State::Fcs { fcs, bit: bit + 1 }
                    } else {
                        State::Flag { bit: 0, kind: FlagKind::Closing }
                    };

                    return self.count(((fcs >> bit) & 1) as u8);
                },
            }
        }
    }

    fn next_data(&mut self, cur: &mut Cursor<'_>) {
        self.state = match cur.src.get(cur.consumed) {
            Some(&byte) => {
                cur.consumed += 1;
                self.crc.put_u8(byte);
                State::Data { byte, bit: 0 }
            },
            None => State::Fcs { fcs: self.crc.fcs(), bit: 0 },
        };
    }

    fn count(&mut self, bit: u8) -> u8 {
        if bit == 1 {
            self.ones += 1;
        } else {
            self.ones = 0;
        }

        bit
    }

    fn put_bit(&mut self, bit: u8) -> Option<u8> {
        self.out = (self.out << 1) | bit;
        self.out_bits += 1;

        if self.config.adapt56 && self.out_bits == 7 {
            self.out = (self.out << 1) | consts::mask::ADAPT56_FILL;
            self.out_bits += 1;
        }

        if self.out_bits < 8 {
            return None;
        }

        let byte = std::mem::take(&mut self.out);
        self.out_bits = 0;

        if self.config.bit_reversed {
            Some(consts::BIT_REVERSE[byte as usize])
        } else {
            Some(byte)
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    fn encode_all(enc: &mut Encoder, src: &[u8], chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0; chunk];
        let mut offset = 0;

        loop {
            let res = enc.encode(&src[offset..], &mut buf);

            offset += res.consumed;
            out.extend_from_slice(&buf[..res.written]);

            if res.complete {
                break;
            }
        }

        assert_eq!(offset, src.len());
        out
    }

    #[test]
    fn test_encode_single() {
        let mut enc = Encoder::new(Config::b_channel());
        let mut buf = [0; 16];

        let res = enc.encode(&[0x00], &mut buf);
        assert_eq!(res, Encoded { consumed: 1, written: 5, complete: true });
        assert_eq!(&buf[..5], &[0x7e, 0x00, 0x1e, 0x0f, 0x7e]);
    }

    #[test]
    fn test_encode_stuffed() {
        let mut enc = Encoder::new(Config::b_channel());
        let mut buf = [0; 16];

        let res = enc.encode(&[0xff], &mut buf);
        assert_eq!(res, Encoded { consumed: 1, written: 6, complete: true });
        assert_eq!(&buf[..6], &[0x7e, 0xfb, 0x80, 0x7d, 0xdf, 0x9f]);

        // the fill flag started by the last octet is completed first
        assert_eq!(enc.state, State::Flag { bit: 6, kind: FlagKind::Fill });
    }

    #[test]
    fn test_encode_fragments() {
        let payload = [0x01, 0xff, 0x7e, 0x3f, 0x00, 0xfc];

        let mut enc = Encoder::new(Config::b_channel());
        let whole = encode_all(&mut enc, &payload, 64);

        for chunk in [1, 2, 3, 7] {
            let mut enc = Encoder::new(Config::b_channel());
            assert_eq!(encode_all(&mut enc, &payload, chunk), whole);
        }
    }

    #[test]
    fn test_encode_filler() {
        let mut buf = [0; 4];

        let mut enc = Encoder::new(Config::b_channel());
        let res = enc.encode(&[], &mut buf);
        assert_eq!(res, Encoded { consumed: 0, written: 4, complete: true });
        assert_eq!(buf, [0x7e; 4]);

        let mut enc = Encoder::new(Config::d_channel());
        let res = enc.encode(&[], &mut buf);
        assert_eq!(res, Encoded { consumed: 0, written: 4, complete: true });
        assert_eq!(buf, [0xff; 4]);

        // nothing to write into
        let res = enc.encode(&[0x00], &mut []);
        assert_eq!(res, Encoded { consumed: 0, written: 0, complete: false });
    }

    #[test]
    fn test_encode_d_channel() {
        let mut enc = Encoder::new(Config::d_channel());
        let mut buf = [0; 16];

        let res = enc.encode(&[0x00], &mut buf);
        assert_eq!(res.written, 5);
        assert_eq!(&buf[..5], &[0x7e, 0x00, 0x1e, 0x0f, 0x7e]);

        let res = enc.encode(&[], &mut buf[..2]);
        assert_eq!(res.written, 2);
        assert_eq!(&buf[..2], &[0xff, 0xff]);

        // unaligned frame end is padded with ones
        let res = enc.encode(&[0xff], &mut buf);
        assert_eq!(res.written, 6);
        assert_eq!(&buf[..6], &[0x7e, 0xfb, 0x80, 0x7d, 0xdf, 0xbf]);
    }

    #[test]
    fn test_encode_shared_flag() {
        let mut enc = Encoder::new(Config::b_channel());
        let mut buf = [0; 16];

        enc.encode(&[0x00], &mut buf);
        assert_eq!(enc.state, State::Flagged);

        // the closing flag of the previous frame opens this one
        let res = enc.encode(&[0x00], &mut buf);
        assert_eq!(res.written, 4);
        assert_eq!(&buf[..4], &[0x00, 0x1e, 0x0f, 0x7e]);
    }

    #[test]
    fn test_encode_adapt56() {
        let config = Config { adapt56: true, ..Config::b_channel() };
        let mut enc = Encoder::new(config);
        let mut buf = [0; 16];

        let res = enc.encode(&[0x00], &mut buf);
        assert!(res.complete);

        // 40 frame bits in 7 bit units, padded with fill flag bits
        assert_eq!(res.written, 6);
        assert!(buf[..6].iter().all(|b| b & consts::mask::ADAPT56_FILL != 0));
        assert_eq!(buf[0], 0x7e | 0x01);
    }

    #[test]
    fn test_encode_bit_reversed() {
        let config = Config { bit_reversed: true, ..Config::b_channel() };
        let mut enc = Encoder::new(config);
        let mut buf = [0; 16];

        let res = enc.encode(&[0x00], &mut buf);
        assert_eq!(res.written, 5);
        assert_eq!(&buf[..5], &[0x7e, 0x00, 0x78, 0xf0, 0x7e]);
    }

    #[test]
    fn test_encode_frame() {
        let mut enc = Encoder::new(Config::b_channel());
        let mut dst = BytesMut::new();

        enc.encode_frame(&[], &mut dst);
        assert!(dst.is_empty());

        enc.encode_frame(&[0x00], &mut dst);
        assert_eq!(&dst[..], &[0x7e, 0x00, 0x1e, 0x0f, 0x7e]);

        let payload = vec![0xa5; 300];
        enc.encode_frame(&payload, &mut dst);
        assert!(dst.len() >= 5 + 300 + 3);
        assert!(!enc.state.in_frame());
    }
}
