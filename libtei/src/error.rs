use crate::arena::LinkId;
use crate::fsm::Role;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Only SAPI 0 links are managed.
    UnsupportedSapi(u8),

    /// TEI out of range, or in the automatic range on the user side.
    InvalidTei(u8),

    /// Link role does not match the side of the entity.
    RoleMismatch { entity: Role, link: Role },

    UnknownLink(LinkId),

    /// Broadcast unit data is only sent by the network side.
    UnitDataNotAllowed,

    /// The service task is gone.
    ServiceStopped,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnsupportedSapi(sapi) => write!(f, "unsupported SAPI: {sapi}"),
            Error::InvalidTei(tei) => write!(f, "invalid TEI: {tei}"),
            Error::RoleMismatch { entity, link } => {
                write!(f, "cannot open {link:?} link on {entity:?} side")
            },
            Error::UnknownLink(id) => write!(f, "unknown link: {id}"),
            Error::UnitDataNotAllowed => write!(f, "unit data can only be sent on the network side"),
            Error::ServiceStopped => write!(f, "service stopped"),
        }
    }
}

impl std::error::Error for Error {}

impl<T> From<futures::channel::mpsc::TrySendError<T>> for Error {
    fn from(_: futures::channel::mpsc::TrySendError<T>) -> Self {
        Error::ServiceStopped
    }
}

impl From<futures::channel::oneshot::Canceled> for Error {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        Error::ServiceStopped
    }
}
