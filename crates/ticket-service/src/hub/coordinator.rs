//! `HubCoordinator` - single owner of the session registry and subscriber index.
//!
//! The coordinator processes one `HubMessage` at a time from a bounded queue.
//! Nothing else holds a reference to the registry, so fan-out always iterates
//! a subscriber set that cannot change underneath it.
//!
//! Delivery into a session mailbox uses `try_send`. A full mailbox drops the
//! message for that session only.
//!
//! # Shutdown
//!
//! Cancelling the token clears the registry. That drops every mailbox sender,
//! which makes each session's outbound path close its connection.

use crate::errors::TicketError;
use crate::observability::metrics as prom;
use crate::protocol::ServerMessage;

use super::messages::{BroadcastReport, HubMessage, HubStatus, Mailbox, SessionInfo};
use super::metrics::HubMetrics;

use common::types::{EventId, SessionId, SubjectId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to the `HubCoordinator`.
///
/// Cheap to clone. Sessions and the booking engine each hold one; none of
/// them owns the coordinator.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
    metrics: Arc<HubMetrics>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("queue_depth", &self.metrics.queue_depth())
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish()
    }
}

impl HubHandle {
    /// Spawn the coordinator task and return a handle plus its join handle.
    #[must_use]
    pub fn spawn(queue_capacity: usize, cancel_token: CancellationToken) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(HubMetrics::new());

        let coordinator =
            HubCoordinator::new(receiver, cancel_token.clone(), Arc::clone(&metrics));
        let task = tokio::spawn(coordinator.run());

        (
            Self {
                sender,
                cancel_token,
                metrics,
            },
            task,
        )
    }

    async fn enqueue(&self, message: HubMessage) -> Result<(), TicketError> {
        self.metrics.record_enqueue();
        self.sender.send(message).await.map_err(|e| {
            self.metrics.record_enqueue_failed();
            TicketError::hub_unavailable(format!("channel send failed: {e}"))
        })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubMessage,
    ) -> Result<T, TicketError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(build(tx)).await?;
        rx.await
            .map_err(|e| TicketError::hub_unavailable(format!("response receive failed: {e}")))
    }

    /// Register a session. The hub sends it a `connection_ack` immediately.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id is already registered; `Internal` if the hub is gone.
    pub async fn register(
        &self,
        session_id: SessionId,
        subject: SubjectId,
        mailbox: Mailbox,
    ) -> Result<(), TicketError> {
        self.request(|respond_to| HubMessage::Register {
            session_id,
            subject,
            mailbox,
            respond_to,
        })
        .await?
    }

    /// Remove a session. Returns `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn unregister(&self, session_id: SessionId) -> Result<bool, TicketError> {
        self.request(|respond_to| HubMessage::Unregister {
            session_id,
            respond_to,
        })
        .await
    }

    /// Returns `true` if the session was not already subscribed.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session; `Internal` if the hub is gone.
    pub async fn subscribe(
        &self,
        session_id: SessionId,
        event_id: EventId,
    ) -> Result<bool, TicketError> {
        self.request(|respond_to| HubMessage::Subscribe {
            session_id,
            event_id,
            respond_to,
        })
        .await?
    }

    /// Returns `true` if the session was subscribed.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session; `Internal` if the hub is gone.
    pub async fn unsubscribe(
        &self,
        session_id: SessionId,
        event_id: EventId,
    ) -> Result<bool, TicketError> {
        self.request(|respond_to| HubMessage::Unsubscribe {
            session_id,
            event_id,
            respond_to,
        })
        .await?
    }

    /// Fan out and wait for the delivery report.
    ///
    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn broadcast(&self, message: ServerMessage) -> Result<BroadcastReport, TicketError> {
        let message = Arc::new(message);
        self.request(|respond_to| HubMessage::Broadcast {
            message,
            respond_to: Some(respond_to),
        })
        .await
    }

    /// Enqueue a fan-out without waiting for it to be processed.
    ///
    /// Publishes from one caller are processed in call order.
    ///
    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn publish(&self, message: ServerMessage) -> Result<(), TicketError> {
        self.enqueue(HubMessage::Broadcast {
            message: Arc::new(message),
            respond_to: None,
        })
        .await
    }

    /// Wait for room in the coordinator queue and hold it.
    ///
    /// Publishing through the returned slot never waits, so a caller can
    /// commit a change and announce it with no await point in between.
    ///
    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn reserve_publish(&self) -> Result<PublishSlot<'_>, TicketError> {
        let permit = self
            .sender
            .reserve()
            .await
            .map_err(|e| TicketError::hub_unavailable(format!("channel reserve failed: {e}")))?;
        Ok(PublishSlot {
            permit,
            metrics: &self.metrics,
        })
    }

    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn status(&self) -> Result<HubStatus, TicketError> {
        self.request(|respond_to| HubMessage::GetStatus { respond_to })
            .await
    }

    /// Sessions currently indexed under `event_id`, in no particular order.
    ///
    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn subscribers(&self, event_id: EventId) -> Result<Vec<SessionId>, TicketError> {
        self.request(|respond_to| HubMessage::GetSubscribers {
            event_id,
            respond_to,
        })
        .await
    }

    /// # Errors
    ///
    /// `Internal` if the hub is gone.
    pub async fn session(&self, session_id: SessionId) -> Result<Option<SessionInfo>, TicketError> {
        self.request(|respond_to| HubMessage::GetSession {
            session_id,
            respond_to,
        })
        .await
    }

    /// Stop the coordinator and release every session.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }
}

/// A reserved place in the hub queue for one fan-out.
///
/// Dropping an unused slot releases the place.
pub struct PublishSlot<'a> {
    permit: mpsc::Permit<'a, HubMessage>,
    metrics: &'a HubMetrics,
}

impl PublishSlot<'_> {
    /// Enqueue a fan-out into the reserved place.
    pub fn publish(self, message: ServerMessage) {
        self.metrics.record_enqueue();
        self.permit.send(HubMessage::Broadcast {
            message: Arc::new(message),
            respond_to: None,
        });
    }
}

impl std::fmt::Debug for PublishSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSlot").finish_non_exhaustive()
    }
}

struct RegisteredSession {
    subject: SubjectId,
    mailbox: Mailbox,
    /// Authoritative subscription set for this session.
    subscriptions: HashSet<EventId>,
    dropped: u64,
}

enum Delivery {
    Delivered,
    Dropped,
    /// Receiver gone; the session is tearing down and will unregister.
    Closed,
}

/// The coordinator task state.
pub struct HubCoordinator {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    sessions: HashMap<SessionId, RegisteredSession>,
    /// event id -> subscribing sessions. Never holds an empty set.
    subscribers: HashMap<EventId, HashSet<SessionId>>,
    metrics: Arc<HubMetrics>,
}

impl HubCoordinator {
    fn new(
        receiver: mpsc::Receiver<HubMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            sessions: HashMap::new(),
            subscribers: HashMap::new(),
            metrics,
        }
    }

    #[instrument(skip_all, name = "ticket.hub.coordinator")]
    async fn run(mut self) {
        info!(target: "ticket.hub", "HubCoordinator started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "ticket.hub",
                        sessions = self.sessions.len(),
                        "HubCoordinator received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.metrics.record_dequeue();
                            self.handle_message(message);
                        }
                        None => {
                            info!(target: "ticket.hub", "HubCoordinator channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        self.sessions.clear();
        self.subscribers.clear();
        self.publish_gauges();

        info!(
            target: "ticket.hub",
            operations_processed = self.metrics.operations_processed(),
            messages_delivered = self.metrics.messages_delivered(),
            messages_dropped = self.metrics.messages_dropped(),
            "HubCoordinator stopped"
        );
    }

    fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Register {
                session_id,
                subject,
                mailbox,
                respond_to,
            } => {
                let result = self.register(session_id, subject, mailbox);
                let _ = respond_to.send(result);
            }

            HubMessage::Unregister {
                session_id,
                respond_to,
            } => {
                let removed = self.unregister(session_id);
                let _ = respond_to.send(removed);
            }

            HubMessage::Subscribe {
                session_id,
                event_id,
                respond_to,
            } => {
                let result = self.subscribe(session_id, event_id);
                let _ = respond_to.send(result);
            }

            HubMessage::Unsubscribe {
                session_id,
                event_id,
                respond_to,
            } => {
                let result = self.unsubscribe(session_id, event_id);
                let _ = respond_to.send(result);
            }

            HubMessage::Broadcast {
                message,
                respond_to,
            } => {
                let report = self.broadcast(&message);
                if let Some(tx) = respond_to {
                    let _ = tx.send(report);
                }
            }

            HubMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }

            HubMessage::GetSubscribers {
                event_id,
                respond_to,
            } => {
                let ids = self
                    .subscribers
                    .get(&event_id)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                let _ = respond_to.send(ids);
            }

            HubMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let info = self.sessions.get(&session_id).map(|s| {
                    let mut subscriptions: Vec<EventId> = s.subscriptions.iter().copied().collect();
                    subscriptions.sort_unstable();
                    SessionInfo {
                        subject: s.subject,
                        subscriptions,
                        dropped: s.dropped,
                    }
                });
                let _ = respond_to.send(info);
            }
        }
    }

    fn register(
        &mut self,
        session_id: SessionId,
        subject: SubjectId,
        mailbox: Mailbox,
    ) -> Result<(), TicketError> {
        if self.sessions.contains_key(&session_id) {
            warn!(
                target: "ticket.hub",
                session_id = %session_id,
                "Duplicate session registration rejected"
            );
            return Err(TicketError::Conflict(format!(
                "Session {session_id} is already registered"
            )));
        }

        let mut session = RegisteredSession {
            subject,
            mailbox,
            subscriptions: HashSet::new(),
            dropped: 0,
        };
        let ack = Arc::new(ServerMessage::connection_ack(session_id));
        match Self::deliver(session_id, &mut session, &ack) {
            Delivery::Delivered => self.metrics.record_delivered(1),
            Delivery::Dropped => self.metrics.record_dropped(1),
            Delivery::Closed => {}
        }
        self.sessions.insert(session_id, session);
        self.publish_gauges();

        info!(
            target: "ticket.hub",
            session_id = %session_id,
            subject = %subject,
            sessions = self.sessions.len(),
            "Session registered"
        );
        Ok(())
    }

    fn unregister(&mut self, session_id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(&session_id) else {
            debug!(
                target: "ticket.hub",
                session_id = %session_id,
                "Unregister for unknown session ignored"
            );
            return false;
        };

        for event_id in &session.subscriptions {
            self.remove_from_index(*event_id, session_id);
        }
        self.publish_gauges();

        info!(
            target: "ticket.hub",
            session_id = %session_id,
            subscriptions = session.subscriptions.len(),
            dropped = session.dropped,
            sessions = self.sessions.len(),
            "Session unregistered"
        );
        // `session.mailbox` is dropped here, closing the mailbox.
        true
    }

    fn subscribe(&mut self, session_id: SessionId, event_id: EventId) -> Result<bool, TicketError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| TicketError::NotFound(format!("Session {session_id} not registered")))?;

        if !session.subscriptions.insert(event_id) {
            return Ok(false);
        }
        self.subscribers
            .entry(event_id)
            .or_default()
            .insert(session_id);
        self.publish_gauges();

        debug!(
            target: "ticket.hub",
            session_id = %session_id,
            event_id = %event_id,
            "Session subscribed"
        );
        Ok(true)
    }

    fn unsubscribe(
        &mut self,
        session_id: SessionId,
        event_id: EventId,
    ) -> Result<bool, TicketError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| TicketError::NotFound(format!("Session {session_id} not registered")))?;

        if !session.subscriptions.remove(&event_id) {
            return Ok(false);
        }
        self.remove_from_index(event_id, session_id);
        self.publish_gauges();

        debug!(
            target: "ticket.hub",
            session_id = %session_id,
            event_id = %event_id,
            "Session unsubscribed"
        );
        Ok(true)
    }

    fn remove_from_index(&mut self, event_id: EventId, session_id: SessionId) {
        if let Some(set) = self.subscribers.get_mut(&event_id) {
            set.remove(&session_id);
            if set.is_empty() {
                self.subscribers.remove(&event_id);
            }
        }
    }

    fn broadcast(&mut self, message: &Arc<ServerMessage>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let recipients: Vec<SessionId> = match message.event_id {
            Some(event_id) => {
                prom::record_broadcast("event");
                self.subscribers
                    .get(&event_id)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default()
            }
            None => {
                prom::record_broadcast("all");
                self.sessions.keys().copied().collect()
            }
        };
        report.recipients = recipients.len();

        for session_id in recipients {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };
            match Self::deliver(session_id, session, message) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Dropped => report.dropped += 1,
                Delivery::Closed => {}
            }
        }

        self.metrics.record_delivered(report.delivered as u64);
        self.metrics.record_dropped(report.dropped as u64);

        debug!(
            target: "ticket.hub",
            kind = message.kind(),
            event_id = ?message.event_id,
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast complete"
        );
        report
    }

    fn deliver(
        session_id: SessionId,
        session: &mut RegisteredSession,
        message: &Arc<ServerMessage>,
    ) -> Delivery {
        match session.mailbox.try_send(Arc::clone(message)) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                session.dropped += 1;
                warn!(
                    target: "ticket.hub",
                    session_id = %session_id,
                    kind = message.kind(),
                    dropped = session.dropped,
                    "Session mailbox full, message dropped"
                );
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn status(&self) -> HubStatus {
        HubStatus {
            session_count: self.sessions.len(),
            subscribed_event_count: self.subscribers.len(),
            subscription_count: self.subscription_count(),
            messages_delivered: self.metrics.messages_delivered(),
            messages_dropped: self.metrics.messages_dropped(),
        }
    }

    fn subscription_count(&self) -> usize {
        self.subscribers.values().map(HashSet::len).sum()
    }

    fn publish_gauges(&self) {
        prom::set_sessions_active(self.sessions.len());
        prom::set_subscriptions_active(self.subscription_count());
    }
}
