//! Flag patterns, masks and lookup tables used by the bit-level codec.
//!
//! Line octets are processed MSB first, i.e. bit 7 of an octet is the first
//! bit on the wire. HDLC payload octets are sent LSB first.

pub mod flags {
    /// Opening/closing flag, `01111110`.
    pub const FRAME: u8 = 0x7E;

    /// Idle line (and abort), all ones.
    pub const IDLE: u8 = 0xFF;
}

pub mod mask {
    /// Data bits of a line octet.
    pub const FULL: u8 = 0xFF;

    /// Data bits of a line octet with 56k adaptation, the lowest bit is
    /// reserved.
    pub const ADAPT56: u8 = 0xFE;

    /// Value of the reserved bit with 56k adaptation.
    pub const ADAPT56_FILL: u8 = 0x01;
}

pub mod crc {
    /// Accumulator seed at the start of each frame.
    pub const INIT: u16 = 0xFFFF;

    /// Residue of the accumulator after a frame including its FCS.
    pub const GOOD: u16 = 0xF0B8;
}

/// Maximum number of consecutive ones in stuffed data.
pub const MAX_ONES: u8 = 5;

/// Consecutive ones in a flag.
pub const FLAG_ONES: u8 = 6;

/// Consecutive ones that mark an idle line (or an abort).
pub const IDLE_ONES: u8 = 7;


/// Octet bit-order reversal.
pub static BIT_REVERSE: [u8; 256] = bit_reverse_table();

const fn bit_reverse_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;

    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }

    table
}
