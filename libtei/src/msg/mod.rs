//! TEI management messages and their wire format.
//!
//! Management messages are carried in UI frames on SAPI 63, addressed to the
//! group TEI 127. A complete frame is eight octets long: three octets of
//! layer 2 header (address and control field) followed by the five octet
//! message body (entity id, reference number, message type, action
//! indicator).

mod codec;
mod types;

pub use codec::{unit_data_frame, DecodeError, BODY_LEN, FRAME_LEN, HEADER_LEN};
pub use types::*;
