use super::{Message, MessageType, ENTITY_ID, GROUP_TEI, SIGNALLING_SAPI, TEI_SAPI, UI};

use bytes::{Buf, BufMut, Bytes, BytesMut};


/// Length of the layer 2 header (address and control field).
pub const HEADER_LEN: usize = 3;

/// Length of the management message body.
pub const BODY_LEN: usize = 5;

/// Length of a complete management frame.
pub const FRAME_LEN: usize = HEADER_LEN + BODY_LEN;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough data for a management frame.
    Truncated(usize),

    /// Frame is not addressed to the management entity.
    NotManagement,

    /// Address field extension bits are invalid.
    InvalidAddress,

    /// Control field is not a UI frame.
    NotUi(u8),

    /// Unknown layer management entity identifier.
    InvalidEntity(u8),

    /// Unknown message type.
    InvalidType(u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated(len) => write!(f, "short management frame ({len}/{FRAME_LEN} bytes)"),
            DecodeError::NotManagement => write!(f, "frame is not addressed to the management entity"),
            DecodeError::InvalidAddress => write!(f, "address field extension bits are invalid"),
            DecodeError::NotUi(ctrl) => write!(f, "unexpected control field: {ctrl:#04x}"),
            DecodeError::InvalidEntity(id) => write!(f, "unknown management entity: {id:#04x}"),
            DecodeError::InvalidType(ty) => write!(f, "unknown message type: {ty}"),
        }
    }
}

impl std::error::Error for DecodeError {}


/// Broadcast UI frame from the network side carrying `payload` on the
/// signalling SAPI.
pub fn unit_data_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());

    buf.put_u8((SIGNALLING_SAPI << 2) | 0x02);
    buf.put_u8((GROUP_TEI << 1) | 0x01);
    buf.put_u8(UI);
    buf.put_slice(payload);

    buf.freeze()
}


impl Message {
    /// Append the message body.
    pub fn encode_body<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(ENTITY_ID);
        buf.put_u16(self.ri);
        buf.put_u8(self.kind.into());
        buf.put_u8((self.tei << 1) | 1);
    }

    /// Append the message as complete management frame. The C/R bit is set
    /// for frames sent by the network side.
    pub fn encode_frame<B: BufMut>(&self, network: bool, buf: &mut B) {
        let cr = if network { 0x02 } else { 0x00 };

        buf.put_u8((TEI_SAPI << 2) | cr);
        buf.put_u8((GROUP_TEI << 1) | 0x01);
        buf.put_u8(UI);

        self.encode_body(buf);
    }

    pub fn to_frame(&self, network: bool) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        self.encode_frame(network, &mut buf);
        buf.freeze()
    }

    pub fn decode_body(mut data: &[u8]) -> Result<Message, DecodeError> {
        if data.len() < BODY_LEN {
            return Err(DecodeError::Truncated(data.len() + HEADER_LEN));
        }

        let entity = data.get_u8();
        if entity != ENTITY_ID {
            return Err(DecodeError::InvalidEntity(entity));
        }

        let ri = data.get_u16();

        let ty = data.get_u8();
        let kind = MessageType::try_from(ty)
            .map_err(|_| DecodeError::InvalidType(ty))?;

        let tei = data.get_u8() >> 1;

        Ok(Message { kind, ri, tei })
    }

    /// Parse and validate a complete management frame.
    pub fn decode_frame(data: &[u8]) -> Result<Message, DecodeError> {
        if data.len() < FRAME_LEN {
            return Err(DecodeError::Truncated(data.len()));
        }

        if data[0] >> 2 != TEI_SAPI {
            return Err(DecodeError::NotManagement);
        }

        // EA0 must be cleared, EA1 set
        if data[0] & 0x01 != 0 || data[1] & 0x01 == 0 {
            return Err(DecodeError::InvalidAddress);
        }

        if data[1] >> 1 != GROUP_TEI {
            return Err(DecodeError::NotManagement);
        }

        // ignore the P bit
        if data[2] & 0xef != UI {
            return Err(DecodeError::NotUi(data[2]));
        }

        Self::decode_body(&data[HEADER_LEN..])
    }
}


#[cfg(test)]
mod test {
    use super::*;

    use pretty_hex::simple_hex;

    #[test]
    fn test_encode() {
        let msg = Message::assigned(0x1234, 64);

        let mut buf = BytesMut::new();
        msg.encode_body(&mut buf);
        assert_eq!(&buf[..], &[0x0f, 0x12, 0x34, 0x02, 0x81]);

        let frame = msg.to_frame(true);
        assert_eq!(&frame[..], &[0xfe, 0xff, 0x03, 0x0f, 0x12, 0x34, 0x02, 0x81], "{}", simple_hex(&frame));

        let frame = Message::request(0xbeef).to_frame(false);
        assert_eq!(&frame[..], &[0xfc, 0xff, 0x03, 0x0f, 0xbe, 0xef, 0x01, 0xff], "{}", simple_hex(&frame));
    }

    #[test]
    fn test_unit_data_frame() {
        let frame = unit_data_frame(&[0x08, 0x01, 0x05, 0x45, 0x08]);
        assert_eq!(&frame[..], &[0x02, 0xff, 0x03, 0x08, 0x01, 0x05, 0x45, 0x08], "{}", simple_hex(&frame));

        // same length as a management frame, but on the signalling SAPI
        assert_eq!(Message::decode_frame(&frame), Err(DecodeError::NotManagement));

        assert_eq!(&unit_data_frame(&[])[..], &[0x02, 0xff, 0x03]);
    }

    #[test]
    fn test_decode() {
        let raw = [0xfe, 0xff, 0x03, 0x0f, 0x12, 0x34, 0x02, 0x81];
        assert_eq!(Message::decode_frame(&raw), Ok(Message::assigned(0x1234, 64)));

        // P bit set
        let raw = [0xfc, 0xff, 0x13, 0x0f, 0x00, 0x00, 0x07, 0x89];
        assert_eq!(Message::decode_frame(&raw), Ok(Message::verify(68)));

        // trailing data is ignored
        let raw = [0xfc, 0xff, 0x03, 0x0f, 0x00, 0x07, 0x05, 0x83, 0x00];
        assert_eq!(Message::decode_frame(&raw), Ok(Message::check_response(7, 65)));
    }

    const FRAME: [u8; 8] = [0xfe, 0xff, 0x03, 0x0f, 0x12, 0x34, 0x02, 0x81];

    fn check(modify: impl FnOnce(&mut [u8; 8]), err: DecodeError) {
        let mut raw = FRAME;
        modify(&mut raw);
        assert_eq!(Message::decode_frame(&raw), Err(err), "{}", simple_hex(&raw));
    }

    #[test]
    fn test_decode_invalid() {
        check(|r| r[0] = 0x02, DecodeError::NotManagement);
        check(|r| r[0] |= 0x01, DecodeError::InvalidAddress);
        check(|r| r[1] &= !0x01, DecodeError::InvalidAddress);
        check(|r| r[1] = 0x81, DecodeError::NotManagement);
        check(|r| r[2] = 0x13 | 0x04, DecodeError::NotUi(0x17));
        check(|r| r[3] = 0x0e, DecodeError::InvalidEntity(0x0e));
        check(|r| r[6] = 0x08, DecodeError::InvalidType(0x08));
        check(|r| r[6] = 0x00, DecodeError::InvalidType(0x00));

        assert_eq!(Message::decode_frame(&FRAME[..7]), Err(DecodeError::Truncated(7)));
        assert_eq!(Message::decode_body(&FRAME[3..7]), Err(DecodeError::Truncated(7)));
    }
}
