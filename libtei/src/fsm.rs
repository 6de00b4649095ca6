//! TEI assignment state machine of a single data link.
//!
//! The [`Manager`] does not perform any I/O itself. Each event yields a list
//! of [`Action`]s (messages to send, timer changes, notifications to the link
//! layer) that the owning entity carries out.

use std::time::Duration;

use rand::Rng;
use smallvec::SmallVec;

use crate::arena::LinkId;
use crate::msg::{Message, GROUP_TEI};


/// Transmissions of an identity request before giving up.
pub const REQUEST_RETRIES: u8 = 3;

/// Transmissions of an identity verify before removing the TEI.
pub const VERIFY_RETRIES: u8 = 2;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    RequestPending,
    VerifyPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Terminal side, obtains its TEI from the network.
    User,

    /// Network side, hands out TEIs.
    Network,
}

impl Role {
    pub fn is_network(&self) -> bool {
        *self == Role::Network
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The link layer asks for a TEI.
    RequestAssignment,

    /// The link layer asks to verify the current TEI (e.g. after a link error).
    Verify,

    /// Network side: the peer requested an identity, answer with our TEI.
    AssignmentRequested { ri: u16 },

    Assigned { ri: u16, tei: u8 },
    Denied { ri: u16, tei: u8 },
    CheckRequest { tei: u8 },
    Remove { tei: u8 },

    TimerExpired,
}

impl Event {
    /// Event for a received management message, if the message is handled by
    /// the state machine.
    pub fn from_message(msg: &Message) -> Option<Event> {
        use crate::msg::MessageType;

        match msg.kind {
            MessageType::Assigned => Some(Event::Assigned { ri: msg.ri, tei: msg.tei }),
            MessageType::Denied => Some(Event::Denied { ri: msg.ri, tei: msg.tei }),
            MessageType::CheckRequest => Some(Event::CheckRequest { tei: msg.tei }),
            MessageType::Remove => Some(Event::Remove { tei: msg.tei }),
            MessageType::Request | MessageType::CheckResponse | MessageType::Verify => None,
        }
    }
}

/// Notifications to the data link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    AssignmentGranted(u8),
    AssignmentFailed,
    Revoked,
    LinkError,
}

/// The link currently holding a TEI named in an `Assigned` or `Denied`
/// message, and the reference number it obtained it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holder {
    pub link: LinkId,
    pub ri: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Send(Message),
    StartTimer(Duration),
    StopTimer,
    Notify(Notification),

    /// Report a link error to another link (duplicate assignment).
    LinkError(LinkId),

    /// Start verification of the TEI held by the given link.
    Verify(LinkId),
}

pub type Actions = SmallVec<[Action; 4]>;


#[derive(Debug, Clone)]
pub struct Manager {
    state: State,
    tei: u8,
    ri: u16,
    retries: u8,
    fixed: bool,
    timeout: Duration,
}

impl Manager {
    /// Manager for a dynamically assigned TEI. `tei` is the initial TEI,
    /// [`GROUP_TEI`] if none has been assigned yet.
    pub fn new(tei: u8, timeout: Duration) -> Self {
        Self {
            state: State::Idle,
            tei,
            ri: 0,
            retries: 0,
            fixed: false,
            timeout,
        }
    }

    /// Manager for a fixed TEI on the user side, bypassing the assignment
    /// procedure.
    pub fn fixed(tei: u8, timeout: Duration) -> Self {
        Self { fixed: true, ..Self::new(tei, timeout) }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn tei(&self) -> u8 {
        self.tei
    }

    pub fn ri(&self) -> u16 {
        self.ri
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn is_assigned(&self) -> bool {
        self.tei != GROUP_TEI
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a message addressed to `tei` refers to us.
    fn is_addressed(&self, tei: u8) -> bool {
        self.is_assigned() && (tei == GROUP_TEI || tei == self.tei)
    }

    /// Process an event.
    ///
    /// `holder` must be the link currently holding the TEI named by an
    /// `Assigned` or `Denied` event, if any.
    pub fn handle<R>(&mut self, event: Event, holder: Option<Holder>, rng: &mut R) -> Actions
    where
        R: Rng,
    {
        let mut actions = Actions::new();

        if self.fixed {
            self.handle_fixed(event, &mut actions);
            return actions;
        }

        match (self.state, event) {
            (State::Idle, Event::RequestAssignment) => {
                if self.is_assigned() {
                    tracing::debug!(tei = self.tei, "assign request for already assigned tei");
                    return actions;
                }

                self.ri = rng.random();
                tracing::debug!(ri = self.ri, "assign request");

                actions.push(Action::Send(Message::request(self.ri)));
                actions.push(Action::StartTimer(self.timeout));

                self.state = State::RequestPending;
                self.retries = REQUEST_RETRIES;
            },
            (State::Idle, Event::AssignmentRequested { ri }) => {
                if !self.is_assigned() {
                    tracing::debug!(ri, "network assign request without tei");
                    return actions;
                }

                tracing::debug!(ri, tei = self.tei, "network assign request");

                self.ri = ri;
                actions.push(Action::Send(Message::assigned(ri, self.tei)));
            },
            (State::Idle, Event::Assigned { ri, tei } | Event::Denied { ri, tei }) => {
                tracing::trace!(ri, tei, "foreign identity assign");

                if let Some(holder) = holder {
                    if holder.ri != ri {
                        tracing::warn!(tei, link = %holder.link, "possible duplicate assignment");
                        actions.push(Action::Verify(holder.link));
                    }
                }
            },
            (State::Idle, Event::Verify) => {
                if !self.is_assigned() {
                    tracing::debug!("verify request without tei");
                    return actions;
                }

                self.start_verify(&mut actions);
            },
            (State::Idle | State::VerifyPending, Event::CheckRequest { tei }) => {
                tracing::debug!(tei, "identity check request");

                if self.is_addressed(tei) {
                    if self.state != State::Idle {
                        actions.push(Action::StopTimer);
                    }

                    self.state = State::Idle;
                    actions.push(Action::Send(Message::check_response(rng.random(), self.tei)));
                }
            },
            (_, Event::Remove { tei }) => {
                tracing::debug!(tei, "identity remove");

                if self.is_addressed(tei) {
                    if self.state != State::Idle {
                        actions.push(Action::StopTimer);
                    }

                    self.state = State::Idle;
                    self.tei = GROUP_TEI;
                    actions.push(Action::Notify(Notification::Revoked));
                }
            },
            (State::RequestPending, Event::TimerExpired) => {
                self.retries = self.retries.saturating_sub(1);

                if self.retries > 0 {
                    self.ri = rng.random();
                    tracing::debug!(ri = self.ri, attempt = REQUEST_RETRIES + 1 - self.retries, "assign request");

                    actions.push(Action::Send(Message::request(self.ri)));
                    actions.push(Action::StartTimer(self.timeout));
                } else {
                    tracing::warn!("assign request failed");

                    self.state = State::Idle;
                    actions.push(Action::Notify(Notification::AssignmentFailed));
                }
            },
            (State::RequestPending, Event::Assigned { ri, tei }) => {
                tracing::debug!(ri, tei, "identity assign");

                if tei == GROUP_TEI {
                    tracing::debug!(ri, "ignoring assignment of group tei");
                    return actions;
                }

                match holder {
                    Some(holder) => {
                        if holder.ri != ri {
                            tracing::warn!(tei, link = %holder.link, "possible duplicate assignment");
                            actions.push(Action::LinkError(holder.link));
                        }
                    },
                    None if ri == self.ri => {
                        actions.push(Action::StopTimer);
                        actions.push(Action::Notify(Notification::AssignmentGranted(tei)));

                        self.state = State::Idle;
                        self.tei = tei;
                    },
                    None => {},
                }
            },
            (State::RequestPending, Event::Denied { ri, tei }) => {
                tracing::debug!(ri, tei, "identity denied");
            },
            (State::VerifyPending, Event::TimerExpired) => {
                self.verify_expired(&mut actions);
            },
            (state, event) => {
                tracing::trace!(?state, ?event, "event ignored");
            },
        }

        actions
    }

    /// Fixed TEIs are granted locally, only link errors start a verification.
    fn handle_fixed(&mut self, event: Event, actions: &mut Actions) {
        match (self.state, event) {
            (_, Event::RequestAssignment) => {
                tracing::debug!(tei = self.tei, "fixed assign");
                actions.push(Action::Notify(Notification::AssignmentGranted(self.tei)));
            },
            (State::Idle, Event::Verify) => {
                self.start_verify(actions);
            },
            (State::VerifyPending, Event::TimerExpired) => {
                self.verify_expired(actions);
            },
            (_, event) => {
                tracing::trace!(tei = self.tei, ?event, "event ignored for fixed tei");
            },
        }
    }

    fn start_verify(&mut self, actions: &mut Actions) {
        tracing::debug!(tei = self.tei, "id verify request");

        actions.push(Action::Send(Message::verify(self.tei)));
        actions.push(Action::StartTimer(self.timeout));

        self.state = State::VerifyPending;
        self.retries = VERIFY_RETRIES;
    }

    fn verify_expired(&mut self, actions: &mut Actions) {
        self.retries = self.retries.saturating_sub(1);

        if self.retries > 0 {
            tracing::debug!(tei = self.tei, attempt = VERIFY_RETRIES + 1 - self.retries, "id verify request");

            actions.push(Action::Send(Message::verify(self.tei)));
            actions.push(Action::StartTimer(self.timeout));
            return;
        }

        tracing::warn!(tei = self.tei, "verify request failed");

        // a fixed tei stays configured, the link layer decides what to do
        if !self.fixed {
            self.tei = GROUP_TEI;
        }

        self.state = State::Idle;
        actions.push(Action::Notify(Notification::Revoked));
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::arena::Arena;
    use crate::msg::MessageType;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const T: Duration = Duration::from_secs(1);

    fn sent(actions: &Actions) -> Vec<Message> {
        actions.iter()
            .filter_map(|a| match a {
                Action::Send(msg) => Some(*msg),
                _ => None,
            })
            .collect()
    }

    fn notifications(actions: &Actions) -> Vec<Notification> {
        actions.iter()
            .filter_map(|a| match a {
                Action::Notify(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    fn requested(mgr: &mut Manager, rng: &mut StdRng) -> u16 {
        let actions = mgr.handle(Event::RequestAssignment, None, rng);
        assert_eq!(mgr.state(), State::RequestPending);

        let msgs = sent(&actions);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, MessageType::Request);
        assert_eq!(msgs[0].tei, GROUP_TEI);
        assert_eq!(msgs[0].ri, mgr.ri());
        assert!(actions.contains(&Action::StartTimer(T)));

        mgr.ri()
    }

    fn links() -> (LinkId, LinkId) {
        let mut arena = Arena::new();
        (arena.insert(()), arena.insert(()))
    }

    #[test]
    fn test_assignment() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut mgr = Manager::new(GROUP_TEI, T);

        let ri = requested(&mut mgr, &mut rng);

        // foreign ri, not for us
        let actions = mgr.handle(Event::Assigned { ri: ri.wrapping_add(1), tei: 5 }, None, &mut rng);
        assert!(actions.is_empty());
        assert_eq!(mgr.state(), State::RequestPending);

        let actions = mgr.handle(Event::Assigned { ri, tei: 5 }, None, &mut rng);
        assert_eq!(actions.as_slice(), &[
            Action::StopTimer,
            Action::Notify(Notification::AssignmentGranted(5)),
        ]);
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), 5);

        // already assigned
        let actions = mgr.handle(Event::RequestAssignment, None, &mut rng);
        assert!(actions.is_empty());
        assert_eq!(mgr.state(), State::Idle);
    }

    #[test]
    fn test_request_retries() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut mgr = Manager::new(GROUP_TEI, T);

        requested(&mut mgr, &mut rng);

        let mut failed = 0;
        let mut requests = 1;

        for _ in 0..REQUEST_RETRIES {
            let actions = mgr.handle(Event::TimerExpired, None, &mut rng);

            requests += sent(&actions).len();
            failed += notifications(&actions).iter()
                .filter(|n| **n == Notification::AssignmentFailed)
                .count();
        }

        assert_eq!(requests, REQUEST_RETRIES as usize);
        assert_eq!(failed, 1);
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), GROUP_TEI);

        // late expiry is ignored
        assert!(mgr.handle(Event::TimerExpired, None, &mut rng).is_empty());
    }

    #[test]
    fn test_request_new_ri() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mgr = Manager::new(GROUP_TEI, T);

        let first = requested(&mut mgr, &mut rng);

        let actions = mgr.handle(Event::TimerExpired, None, &mut rng);
        let msgs = sent(&actions);
        assert_eq!(msgs, [Message::request(mgr.ri())]);

        // response to the first request no longer matches, unless the
        // reference number happens to be reused
        let actions = mgr.handle(Event::Assigned { ri: first, tei: 70 }, None, &mut rng);
        if first != mgr.ri() {
            assert!(actions.is_empty());
            assert_eq!(mgr.state(), State::RequestPending);
        }
    }

    #[test]
    fn test_duplicate_while_requesting() {
        let mut rng = StdRng::seed_from_u64(4);
        let (other, _) = links();

        let mut mgr = Manager::new(GROUP_TEI, T);
        let ri = requested(&mut mgr, &mut rng);

        // tei 70 held by another link with a different ri
        let holder = Holder { link: other, ri: ri.wrapping_add(7) };
        let actions = mgr.handle(Event::Assigned { ri, tei: 70 }, Some(holder), &mut rng);

        assert_eq!(actions.as_slice(), &[Action::LinkError(other)]);
        assert_eq!(mgr.state(), State::RequestPending);
        assert_eq!(mgr.tei(), GROUP_TEI);

        // identical ri is not treated as duplicate
        let holder = Holder { link: other, ri };
        let actions = mgr.handle(Event::Assigned { ri, tei: 70 }, Some(holder), &mut rng);
        assert!(actions.is_empty());
        assert_eq!(mgr.state(), State::RequestPending);
    }

    #[test]
    fn test_collision() {
        let mut rng = StdRng::seed_from_u64(5);
        let (a, _) = links();

        // two managers holding the same tei with distinct ri
        let mut mgr_a = Manager::new(GROUP_TEI, T);
        let ri_a = requested(&mut mgr_a, &mut rng);
        mgr_a.handle(Event::Assigned { ri: ri_a, tei: 80 }, None, &mut rng);

        let mut mgr_b = Manager::new(GROUP_TEI, T);
        let ri_b = requested(&mut mgr_b, &mut rng);
        mgr_b.handle(Event::Assigned { ri: ri_b, tei: 80 }, None, &mut rng);

        assert_eq!(mgr_a.tei(), 80);
        assert_eq!(mgr_b.tei(), 80);

        // a sees the assignment for b
        let holder = Holder { link: a, ri: mgr_a.ri() };
        let actions = mgr_a.handle(Event::Assigned { ri: ri_b, tei: 80 }, Some(holder), &mut rng);

        if ri_a != ri_b {
            assert_eq!(actions.as_slice(), &[Action::Verify(a)]);
        }

        // verification instead of immediate removal
        let actions = mgr_a.handle(Event::Verify, None, &mut rng);
        assert_eq!(sent(&actions), [Message::verify(80)]);
        assert_eq!(mgr_a.state(), State::VerifyPending);
        assert_eq!(mgr_a.tei(), 80);
    }

    #[test]
    fn test_verify() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut mgr = Manager::new(90, T);

        let actions = mgr.handle(Event::Verify, None, &mut rng);
        assert_eq!(sent(&actions), [Message::verify(90)]);
        assert!(actions.contains(&Action::StartTimer(T)));
        assert_eq!(mgr.state(), State::VerifyPending);

        // second transmission
        let actions = mgr.handle(Event::TimerExpired, None, &mut rng);
        assert_eq!(sent(&actions), [Message::verify(90)]);
        assert_eq!(mgr.state(), State::VerifyPending);

        // give up
        let actions = mgr.handle(Event::TimerExpired, None, &mut rng);
        assert_eq!(actions.as_slice(), &[Action::Notify(Notification::Revoked)]);
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), GROUP_TEI);

        // nothing to verify
        assert!(mgr.handle(Event::Verify, None, &mut rng).is_empty());
    }

    #[test]
    fn test_check_request() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut mgr = Manager::new(90, T);

        // other tei
        assert!(mgr.handle(Event::CheckRequest { tei: 91 }, None, &mut rng).is_empty());

        let actions = mgr.handle(Event::CheckRequest { tei: 90 }, None, &mut rng);
        let msgs = sent(&actions);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, MessageType::CheckResponse);
        assert_eq!(msgs[0].tei, 90);

        // check during verification answers and stops the timer
        mgr.handle(Event::Verify, None, &mut rng);
        let actions = mgr.handle(Event::CheckRequest { tei: GROUP_TEI }, None, &mut rng);
        assert_eq!(actions[0], Action::StopTimer);
        assert_eq!(sent(&actions).len(), 1);
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), 90);

        // unassigned links do not answer
        let mut mgr = Manager::new(GROUP_TEI, T);
        assert!(mgr.handle(Event::CheckRequest { tei: GROUP_TEI }, None, &mut rng).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut rng = StdRng::seed_from_u64(8);

        let mut mgr = Manager::new(90, T);
        assert!(mgr.handle(Event::Remove { tei: 91 }, None, &mut rng).is_empty());

        let actions = mgr.handle(Event::Remove { tei: 90 }, None, &mut rng);
        assert_eq!(actions.as_slice(), &[Action::Notify(Notification::Revoked)]);
        assert_eq!(mgr.tei(), GROUP_TEI);

        // broadcast removal during verification
        let mut mgr = Manager::new(90, T);
        mgr.handle(Event::Verify, None, &mut rng);

        let actions = mgr.handle(Event::Remove { tei: GROUP_TEI }, None, &mut rng);
        assert_eq!(actions.as_slice(), &[
            Action::StopTimer,
            Action::Notify(Notification::Revoked),
        ]);
        assert_eq!(mgr.state(), State::Idle);
    }

    #[test]
    fn test_network_assign() {
        let mut rng = StdRng::seed_from_u64(9);

        let mut mgr = Manager::new(64, Duration::from_secs(2));
        let actions = mgr.handle(Event::AssignmentRequested { ri: 0x4242 }, None, &mut rng);
        assert_eq!(actions.as_slice(), &[Action::Send(Message::assigned(0x4242, 64))]);
        assert_eq!(mgr.ri(), 0x4242);
        assert_eq!(mgr.state(), State::Idle);

        let mut mgr = Manager::new(GROUP_TEI, Duration::from_secs(2));
        assert!(mgr.handle(Event::AssignmentRequested { ri: 1 }, None, &mut rng).is_empty());
    }

    #[test]
    fn test_fixed() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut mgr = Manager::fixed(0, T);

        let actions = mgr.handle(Event::RequestAssignment, None, &mut rng);
        assert_eq!(actions.as_slice(), &[Action::Notify(Notification::AssignmentGranted(0))]);

        assert!(mgr.handle(Event::Remove { tei: GROUP_TEI }, None, &mut rng).is_empty());
        assert!(mgr.handle(Event::CheckRequest { tei: GROUP_TEI }, None, &mut rng).is_empty());
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), 0);

        // link error
        let actions = mgr.handle(Event::Verify, None, &mut rng);
        assert_eq!(sent(&actions), [Message::verify(0)]);
        assert_eq!(mgr.state(), State::VerifyPending);

        mgr.handle(Event::TimerExpired, None, &mut rng);
        let actions = mgr.handle(Event::TimerExpired, None, &mut rng);
        assert_eq!(actions.as_slice(), &[Action::Notify(Notification::Revoked)]);
        assert_eq!(mgr.state(), State::Idle);
        assert_eq!(mgr.tei(), 0);
    }

    #[test]
    fn test_from_message() {
        let msg = Message::assigned(3, 65);
        assert_eq!(Event::from_message(&msg), Some(Event::Assigned { ri: 3, tei: 65 }));

        let msg = Message::remove(GROUP_TEI);
        assert_eq!(Event::from_message(&msg), Some(Event::Remove { tei: GROUP_TEI }));

        assert_eq!(Event::from_message(&Message::request(1)), None);
        assert_eq!(Event::from_message(&Message::verify(65)), None);
    }
}
