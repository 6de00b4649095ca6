//! Async driver for an [`Entity`].
//!
//! The [`Service`] owns the entity and runs its timers. Link layer and
//! physical layer talk to it through a cloneable [`ServiceHandle`] and
//! receive everything the entity produces as [`Indication`]s.

use std::collections::HashMap;

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue;

use crate::arena::LinkId;
use crate::entity::{Entity, LinkConfig, Output, Outputs, TimerToken};
use crate::error::Error;
use crate::fsm::Notification;
use crate::msg::Message;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indication {
    /// Frame for the physical layer, to be confirmed via
    /// [`ServiceHandle::confirm`] once sent.
    Transmit { id: u16, frame: Bytes },

    /// The physical layer should be activated.
    Activate,

    Notify { link: LinkId, notification: Notification },

    /// Network side: message from a peer terminal.
    Peer(Message),
}


#[derive(Debug)]
enum Request {
    Open {
        config: LinkConfig,
        reply: oneshot::Sender<Result<LinkId, Error>>,
    },
    Close(LinkId),
    RequestAssignment(LinkId),
    Verify(LinkId),
    AssignmentRequested { link: LinkId, ri: u16 },
    UnitData {
        payload: Bytes,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Receive(Bytes),
    Activated,
    Deactivated,
    Confirm(u16),
}


pub struct Service {
    entity: Entity,
    requests: mpsc::UnboundedReceiver<Request>,
    indications: mpsc::UnboundedSender<Indication>,
    timers: DelayQueue<(LinkId, TimerToken)>,
    keys: HashMap<TimerToken, delay_queue::Key>,
}

impl Service {
    pub fn new(entity: Entity) -> (Service, ServiceHandle, mpsc::UnboundedReceiver<Indication>) {
        let (req_tx, req_rx) = mpsc::unbounded();
        let (ind_tx, ind_rx) = mpsc::unbounded();

        let service = Service {
            entity,
            requests: req_rx,
            indications: ind_tx,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
        };

        let handle = ServiceHandle { sender: req_tx };

        (service, handle, ind_rx)
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Process requests and timers until all handles have been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.next() => match request {
                    Some(request) => self.process(request),
                    None => break,
                },
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    let (link, token) = expired.into_inner();
                    self.keys.remove(&token);

                    let out = self.entity.timer_expired(link, token);
                    self.apply(out);
                },
            }
        }

        tracing::debug!("all handles dropped, stopping tei service");
    }

    fn process(&mut self, request: Request) {
        tracing::trace!(?request, "processing request");

        let result = match request {
            Request::Open { config, reply } => {
                let _ = reply.send(self.entity.open_link(config));
                return;
            },
            Request::Close(link) => self.entity.close_link(link),
            Request::RequestAssignment(link) => self.entity.request_assignment(link),
            Request::Verify(link) => self.entity.verify(link),
            Request::AssignmentRequested { link, ri } => self.entity.assignment_requested(link, ri),
            Request::UnitData { payload, reply } => match self.entity.unit_data(&payload) {
                Ok(out) => {
                    let _ = reply.send(Ok(()));
                    Ok(out)
                },
                Err(e) => {
                    let _ = reply.send(Err(e));
                    return;
                },
            },
            Request::Receive(frame) => Ok(self.entity.receive(&frame)),
            Request::Activated => Ok(self.entity.ph_activated()),
            Request::Deactivated => {
                self.entity.ph_deactivated();
                Ok(Outputs::new())
            },
            Request::Confirm(id) => Ok(self.entity.confirm(id)),
        };

        match result {
            Ok(out) => self.apply(out),
            Err(e) => tracing::warn!("dropping request: {e}"),
        }
    }

    fn apply(&mut self, out: Outputs) {
        for output in out {
            let indication = match output {
                Output::StartTimer { link, token, duration } => {
                    let key = self.timers.insert((link, token), duration);
                    self.keys.insert(token, key);
                    continue;
                },
                Output::StopTimer { token, .. } => {
                    if let Some(key) = self.keys.remove(&token) {
                        self.timers.try_remove(&key);
                    }
                    continue;
                },
                Output::Transmit { id, frame } => Indication::Transmit { id, frame },
                Output::Activate => Indication::Activate,
                Output::Notify { link, notification } => Indication::Notify { link, notification },
                Output::Peer(msg) => Indication::Peer(msg),
            };

            if self.indications.unbounded_send(indication).is_err() {
                tracing::debug!("indication receiver dropped");
            }
        }
    }
}


#[derive(Debug, Clone)]
pub struct ServiceHandle {
    sender: mpsc::UnboundedSender<Request>,
}

impl ServiceHandle {
    pub async fn open_link(&self, config: LinkConfig) -> Result<LinkId, Error> {
        let (reply, receiver) = oneshot::channel();

        self.sender.unbounded_send(Request::Open { config, reply })?;
        receiver.await?
    }

    pub fn close_link(&self, link: LinkId) -> Result<(), Error> {
        self.send(Request::Close(link))
    }

    pub fn request_assignment(&self, link: LinkId) -> Result<(), Error> {
        self.send(Request::RequestAssignment(link))
    }

    pub fn verify(&self, link: LinkId) -> Result<(), Error> {
        self.send(Request::Verify(link))
    }

    pub fn assignment_requested(&self, link: LinkId, ri: u16) -> Result<(), Error> {
        self.send(Request::AssignmentRequested { link, ri })
    }

    /// Network side: broadcast `payload` to all terminals.
    pub async fn unit_data(&self, payload: Bytes) -> Result<(), Error> {
        let (reply, receiver) = oneshot::channel();

        self.sender.unbounded_send(Request::UnitData { payload, reply })?;
        receiver.await?
    }

    /// Pass a frame received on the management SAPI.
    pub fn receive(&self, frame: Bytes) -> Result<(), Error> {
        self.send(Request::Receive(frame))
    }

    pub fn ph_activated(&self) -> Result<(), Error> {
        self.send(Request::Activated)
    }

    pub fn ph_deactivated(&self) -> Result<(), Error> {
        self.send(Request::Deactivated)
    }

    pub fn confirm(&self, id: u16) -> Result<(), Error> {
        self.send(Request::Confirm(id))
    }

    fn send(&self, request: Request) -> Result<(), Error> {
        self.sender.unbounded_send(request)?;
        Ok(())
    }
}
