//! TEI management entity: registry of data links, message dispatch and the
//! transmit path towards the physical layer.
//!
//! The entity is sans-IO. Every operation returns the [`Output`]s it
//! produced: frames to hand to the physical layer, timers to start or stop,
//! and notifications for the data link layer. Timers are run by the caller,
//! which reports expiries back via [`Entity::timer_expired`].

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::arena::{Arena, LinkId};
use crate::error::Error;
use crate::fsm::{Action, Event, Holder, Manager, Notification, Role, State};
use crate::msg::{self, Message, GROUP_TEI, MAX_FIXED_TEI};


/// Highest message id handed to the physical layer.
pub const MAX_MESSAGE_ID: u16 = 0x7ffe;


/// Retry timer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    /// T201, user side.
    pub user: Duration,

    /// T202, network side.
    pub network: Duration,
}

impl Timers {
    pub fn for_role(&self, role: Role) -> Duration {
        match role {
            Role::User => self.user,
            Role::Network => self.network,
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            user: Duration::from_secs(1),
            network: Duration::from_secs(2),
        }
    }
}


/// Parameters of a data link to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub sapi: u8,

    /// Preset TEI. Values up to 63 are fixed TEIs, 127 means "to be
    /// assigned".
    pub tei: u8,

    pub role: Role,
}

impl LinkConfig {
    pub fn new(tei: u8, role: Role) -> Self {
        Self { sapi: 0, tei, role }
    }

    /// Link obtaining its TEI through the assignment procedure.
    pub fn dynamic(role: Role) -> Self {
        Self::new(GROUP_TEI, role)
    }

    pub fn fixed(tei: u8, role: Role) -> Self {
        Self::new(tei, role)
    }

    pub fn is_fixed(&self) -> bool {
        self.tei <= MAX_FIXED_TEI
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Hand a frame to the physical layer. The layer must confirm it via
    /// [`Entity::confirm`] before the next frame is released.
    Transmit { id: u16, frame: Bytes },

    /// Request activation of the physical layer.
    Activate,

    StartTimer { link: LinkId, token: TimerToken, duration: Duration },
    StopTimer { link: LinkId, token: TimerToken },

    Notify { link: LinkId, notification: Notification },

    /// Network side: message from a peer terminal (identity request, check
    /// response or verify), to be handled by the caller.
    Peer(Message),
}

pub type Outputs = Vec<Output>;


#[derive(Debug)]
struct Link {
    manager: Manager,
    sapi: u8,
    timer: Option<TimerToken>,
}


#[derive(Debug)]
struct Transmitter {
    queue: VecDeque<(u16, Bytes)>,
    active: bool,
    activating: bool,
    busy: Option<u16>,
    next_id: u16,
}

impl Transmitter {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            active: false,
            activating: false,
            busy: None,
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = if id >= MAX_MESSAGE_ID { 1 } else { id + 1 };
        id
    }

    fn push(&mut self, frame: Bytes, out: &mut Outputs) {
        let id = self.next_id();
        self.queue.push_back((id, frame));

        if self.active {
            self.send(out);
        } else if !self.activating {
            self.activating = true;
            out.push(Output::Activate);
        }
    }

    fn send(&mut self, out: &mut Outputs) {
        if !self.active || self.busy.is_some() {
            return;
        }

        if let Some((id, frame)) = self.queue.pop_front() {
            self.busy = Some(id);
            out.push(Output::Transmit { id, frame });
        }
    }

    fn confirm(&mut self, id: u16, out: &mut Outputs) {
        if self.busy != Some(id) {
            tracing::debug!(id, busy = ?self.busy, "unexpected transmit confirmation");
            return;
        }

        self.busy = None;
        self.send(out);
    }

    fn activated(&mut self, out: &mut Outputs) {
        self.active = true;
        self.activating = false;
        self.send(out);
    }

    fn deactivated(&mut self) {
        self.active = false;
        self.activating = false;
        self.busy = None;
    }
}


pub struct Entity {
    role: Role,
    timers: Timers,
    links: Arena<Link>,
    rng: StdRng,
    next_token: u64,
    tx: Transmitter,
}

impl Entity {
    pub fn new(role: Role) -> Self {
        Self::with_rng(role, Timers::default(), StdRng::from_os_rng())
    }

    pub fn with_timers(role: Role, timers: Timers) -> Self {
        Self::with_rng(role, timers, StdRng::from_os_rng())
    }

    pub fn with_rng(role: Role, timers: Timers, rng: StdRng) -> Self {
        Self {
            role,
            timers,
            links: Arena::new(),
            rng,
            next_token: 0,
            tx: Transmitter::new(),
        }
    }

    /// Entity with a seeded random generator for reproducible reference
    /// numbers.
    pub fn seeded(role: Role, timers: Timers, seed: u64) -> Self {
        Self::with_rng(role, timers, StdRng::seed_from_u64(seed))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn timers(&self) -> Timers {
        self.timers
    }

    pub fn links(&self) -> Vec<LinkId> {
        self.links.ids()
    }

    pub fn state(&self, link: LinkId) -> Option<State> {
        self.links.get(link).map(|l| l.manager.state())
    }

    pub fn tei(&self, link: LinkId) -> Option<u8> {
        self.links.get(link).map(|l| l.manager.tei())
    }

    /// Number of frames waiting for the physical layer.
    pub fn queued(&self) -> usize {
        self.tx.queue.len()
    }

    pub fn open_link(&mut self, config: LinkConfig) -> Result<LinkId, Error> {
        if config.sapi != 0 {
            return Err(Error::UnsupportedSapi(config.sapi));
        }

        if config.tei > GROUP_TEI {
            return Err(Error::InvalidTei(config.tei));
        }

        if config.role != self.role {
            return Err(Error::RoleMismatch { entity: self.role, link: config.role });
        }

        // automatic TEIs are only obtained through the assignment procedure
        if self.role == Role::User && !config.is_fixed() && config.tei != GROUP_TEI {
            return Err(Error::InvalidTei(config.tei));
        }

        let timeout = self.timers.for_role(config.role);

        // fixed TEIs skip the assignment procedure on the user side only
        let fixed = config.is_fixed() && config.role == Role::User;

        let manager = if fixed {
            Manager::fixed(config.tei, timeout)
        } else {
            Manager::new(config.tei, timeout)
        };

        let link = Link { manager, sapi: config.sapi, timer: None };
        let id = self.links.insert(link);

        tracing::debug!(link = %id, tei = config.tei, fixed, "link opened");
        Ok(id)
    }

    /// Remove a link, cancelling its timer first.
    pub fn close_link(&mut self, id: LinkId) -> Result<Outputs, Error> {
        let link = self.links.get_mut(id).ok_or(Error::UnknownLink(id))?;
        let mut out = Outputs::new();

        if let Some(token) = link.timer.take() {
            out.push(Output::StopTimer { link: id, token });
        }

        self.links.remove(id);

        tracing::debug!(link = %id, "link closed");
        Ok(out)
    }

    /// The data link layer asks for a TEI.
    pub fn request_assignment(&mut self, id: LinkId) -> Result<Outputs, Error> {
        self.link_event(id, Event::RequestAssignment)
    }

    /// The data link layer reports an error, verify the TEI.
    pub fn verify(&mut self, id: LinkId) -> Result<Outputs, Error> {
        self.link_event(id, Event::Verify)
    }

    /// Network side: assign the TEI of the given link in response to the
    /// identity request with reference number `ri`.
    pub fn assignment_requested(&mut self, id: LinkId, ri: u16) -> Result<Outputs, Error> {
        self.link_event(id, Event::AssignmentRequested { ri })
    }

    /// Process a frame received on the management SAPI.
    pub fn receive(&mut self, frame: &[u8]) -> Outputs {
        let mut out = Outputs::new();

        let msg = match Message::decode_frame(frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("dropping management frame: {e}");
                return out;
            },
        };

        if msg.kind.is_from_network() == self.role.is_network() {
            tracing::debug!(%msg, "dropping message sent in wrong direction");
            return out;
        }

        tracing::debug!(%msg, "received");

        if self.role.is_network() {
            out.push(Output::Peer(msg));
            return out;
        }

        if let Some(event) = Event::from_message(&msg) {
            for id in self.links.ids() {
                self.dispatch(id, event, &mut out);
            }
        }

        out
    }

    /// A timer started via [`Output::StartTimer`] has expired.
    pub fn timer_expired(&mut self, id: LinkId, token: TimerToken) -> Outputs {
        let mut out = Outputs::new();

        match self.links.get_mut(id) {
            Some(link) if link.timer == Some(token) => link.timer = None,
            _ => {
                tracing::debug!(link = %id, token = token.value(), "ignoring stale timer");
                return out;
            },
        }

        self.dispatch(id, Event::TimerExpired, &mut out);
        out
    }

    /// Network side: broadcast `payload` to all terminals in a UI frame on
    /// SAPI 0. The frame shares the transmit queue with management messages.
    pub fn unit_data(&mut self, payload: &[u8]) -> Result<Outputs, Error> {
        if !self.role.is_network() {
            return Err(Error::UnitDataNotAllowed);
        }

        tracing::trace!(len = payload.len(), "unit data request");

        let mut out = Outputs::new();
        self.tx.push(msg::unit_data_frame(payload), &mut out);
        Ok(out)
    }

    pub fn ph_activated(&mut self) -> Outputs {
        let mut out = Outputs::new();
        self.tx.activated(&mut out);
        out
    }

    pub fn ph_deactivated(&mut self) {
        self.tx.deactivated();
    }

    /// The physical layer has sent the frame with the given id.
    pub fn confirm(&mut self, id: u16) -> Outputs {
        let mut out = Outputs::new();
        self.tx.confirm(id, &mut out);
        out
    }

    fn link_event(&mut self, id: LinkId, event: Event) -> Result<Outputs, Error> {
        if !self.links.contains(id) {
            return Err(Error::UnknownLink(id));
        }

        let mut out = Outputs::new();
        self.dispatch(id, event, &mut out);
        Ok(out)
    }

    /// Link holding the given TEI, for duplicate detection.
    fn find_holder(&self, tei: u8) -> Option<Holder> {
        if tei == 0 || tei == GROUP_TEI {
            return None;
        }

        self.links.iter()
            .find(|(_, link)| link.sapi == 0 && link.manager.tei() == tei)
            .map(|(id, link)| Holder { link: id, ri: link.manager.ri() })
    }

    fn dispatch(&mut self, id: LinkId, event: Event, out: &mut Outputs) {
        let mut queue = VecDeque::from([(id, event)]);

        while let Some((id, event)) = queue.pop_front() {
            let holder = match event {
                Event::Assigned { tei, .. } | Event::Denied { tei, .. } => self.find_holder(tei),
                _ => None,
            };

            let Some(link) = self.links.get_mut(id) else {
                tracing::debug!(link = %id, ?event, "event for unknown link");
                continue;
            };

            let actions = link.manager.handle(event, holder, &mut self.rng);

            for action in actions {
                self.apply(id, action, &mut queue, out);
            }
        }
    }

    fn apply(&mut self, id: LinkId, action: Action, queue: &mut VecDeque<(LinkId, Event)>, out: &mut Outputs) {
        match action {
            Action::Send(msg) => {
                tracing::debug!(link = %id, %msg, "sending");
                self.tx.push(msg.to_frame(self.role.is_network()), out);
            },
            Action::StartTimer(duration) => {
                let Some(link) = self.links.get_mut(id) else { return };

                let token = TimerToken(self.next_token);
                self.next_token += 1;

                if let Some(old) = link.timer.replace(token) {
                    out.push(Output::StopTimer { link: id, token: old });
                }

                out.push(Output::StartTimer { link: id, token, duration });
            },
            Action::StopTimer => {
                let Some(link) = self.links.get_mut(id) else { return };

                if let Some(token) = link.timer.take() {
                    out.push(Output::StopTimer { link: id, token });
                }
            },
            Action::Notify(notification) => {
                tracing::debug!(link = %id, ?notification, "notify");
                out.push(Output::Notify { link: id, notification });
            },
            Action::LinkError(other) => {
                out.push(Output::Notify { link: other, notification: Notification::LinkError });
            },
            Action::Verify(other) => {
                queue.push_back((other, Event::Verify));
            },
        }
    }
}
