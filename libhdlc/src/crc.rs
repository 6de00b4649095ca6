//! CRC-16/CCITT frame check sequence (reflected, polynomial `0x8408`).

use super::consts;


const POLY: u16 = 0x8408;

static TABLE: [u16; 256] = table();

const fn table() -> [u16; 256] {
    let mut table = [0; 256];
    let mut i = 0;

    while i < 256 {
        let mut v = i as u16;
        let mut bit = 0;

        while bit < 8 {
            v = if v & 1 == 1 { (v >> 1) ^ POLY } else { v >> 1 };
            bit += 1;
        }

        table[i] = v;
        i += 1;
    }

    table
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self { value: consts::crc::INIT }
    }

    pub fn put_u8(&mut self, byte: u8) {
        self.value = step(self.value, byte);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.put_u8(*b);
        }
    }

    /// Raw accumulator.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Frame check sequence to transmit, sent low octet first.
    pub fn fcs(&self) -> u16 {
        !self.value
    }

    /// Whether the accumulator holds the good-frame residue.
    pub fn is_good(&self) -> bool {
        self.value == consts::crc::GOOD
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}


pub const fn step(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ TABLE[((crc ^ byte as u16) & 0xff) as usize]
}

pub fn fcs16(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.put_bytes(data);
    crc.fcs()
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table() {
        assert_eq!(TABLE[0x00], 0x0000);
        assert_eq!(TABLE[0x01], 0x1189);
        assert_eq!(TABLE[0x80], 0x8408);
        assert_eq!(TABLE[0xff], 0x0f78);
    }

    #[test]
    fn test_check_value() {
        assert_eq!(fcs16(b"123456789"), 0x906e);
        assert_eq!(fcs16(&[0x00]), 0xf078);
        assert_eq!(fcs16(&[0xff]), 0xff00);
    }

    #[test]
    fn test_residue() {
        let data = b"D-channel frame";
        let fcs = fcs16(data);

        let mut crc = Crc16::new();
        crc.put_bytes(data);
        crc.put_bytes(&fcs.to_le_bytes());

        assert_eq!(crc.value(), consts::crc::GOOD);
        assert!(crc.is_good());

        // corrupted FCS
        let mut crc = Crc16::new();
        crc.put_bytes(data);
        crc.put_bytes(&(fcs ^ 0x0100).to_le_bytes());

        assert!(!crc.is_good());
    }
}
