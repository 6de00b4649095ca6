//! TEI management for ISDN D-channel data links.
//!
//! Terminals on a shared bus obtain their terminal endpoint identifier from
//! the network through the assignment procedure: identity requests with a
//! random reference number, answered by assignment or denial, plus checks,
//! verification and removal. This crate implements both sides of the
//! procedure as sans-IO state machines ([`fsm::Manager`] per link, driven by
//! an [`Entity`]) and an async [`Service`] running the timers.

pub mod arena;
pub mod entity;
pub mod error;
pub mod fsm;
pub mod msg;
pub mod service;

pub use arena::LinkId;
pub use entity::{Entity, LinkConfig, Output, Timers};
pub use error::Error;
pub use fsm::{Notification, Role, State};
pub use msg::{Message, MessageType};
pub use service::{Indication, Service, ServiceHandle};
