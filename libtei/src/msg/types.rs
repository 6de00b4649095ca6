//! TEI management messages and related constants.

use num_enum::{IntoPrimitive, TryFromPrimitive};


/// Layer management entity identifier, first octet of every message body.
pub const ENTITY_ID: u8 = 0x0F;

/// Broadcast TEI, also used as "no TEI assigned".
pub const GROUP_TEI: u8 = 127;

/// SAPI reserved for layer 2 management procedures.
pub const TEI_SAPI: u8 = 63;

/// SAPI of call control signalling.
pub const SIGNALLING_SAPI: u8 = 0;

/// Control field of an unnumbered information frame (P bit cleared).
pub const UI: u8 = 0x03;

/// Highest TEI value reserved for fixed (non-automatic) assignment.
pub const MAX_FIXED_TEI: u8 = 63;


#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum MessageType {
    Request = 1,
    Assigned = 2,
    Denied = 3,
    CheckRequest = 4,
    CheckResponse = 5,
    Remove = 6,
    Verify = 7,
}

impl MessageType {
    /// Whether this message is sent by the network side.
    pub fn is_from_network(&self) -> bool {
        match self {
            MessageType::Assigned
            | MessageType::Denied
            | MessageType::CheckRequest
            | MessageType::Remove => true,
            MessageType::Request
            | MessageType::CheckResponse
            | MessageType::Verify => false,
        }
    }
}


/// A TEI management message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,

    /// Reference number correlating requests with responses.
    pub ri: u16,

    /// Action indicator: the TEI the message refers to.
    pub tei: u8,
}

impl Message {
    pub fn new(kind: MessageType, ri: u16, tei: u8) -> Self {
        Self { kind, ri, tei }
    }

    pub fn request(ri: u16) -> Self {
        Self::new(MessageType::Request, ri, GROUP_TEI)
    }

    pub fn assigned(ri: u16, tei: u8) -> Self {
        Self::new(MessageType::Assigned, ri, tei)
    }

    pub fn denied(ri: u16, tei: u8) -> Self {
        Self::new(MessageType::Denied, ri, tei)
    }

    pub fn check_request(tei: u8) -> Self {
        Self::new(MessageType::CheckRequest, 0, tei)
    }

    pub fn check_response(ri: u16, tei: u8) -> Self {
        Self::new(MessageType::CheckResponse, ri, tei)
    }

    pub fn remove(tei: u8) -> Self {
        Self::new(MessageType::Remove, 0, tei)
    }

    pub fn verify(tei: u8) -> Self {
        Self::new(MessageType::Verify, 0, tei)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (ri: {}, tei: {})", self.kind, self.ri, self.tei)
    }
}
