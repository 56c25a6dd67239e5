//! `Session` - one live viewer connection.
//!
//! A session owns both halves of its transport:
//! - Inbound: decodes client frames and turns them into hub operations
//! - Outbound: drains the mailbox, writes frames, and sends liveness probes
//!
//! # Mailbox ownership
//!
//! The hub holds the only strong `Sender` to the mailbox. The session keeps a
//! `WeakSender` for its own replies (`pong`, `error`), so unregistering in the
//! hub closes the mailbox and ends the outbound path.
//!
//! # Lifecycle
//!
//! 1. `run` registers with the hub (the hub sends `connection_ack`)
//! 2. Both paths run until the peer closes, a transport error, liveness
//!    timeout, or the hub releases the mailbox
//! 3. `run` unregisters exactly once and returns why it ended

use crate::config::SessionConfig;
use crate::errors::TicketError;
use crate::hub::HubHandle;
use crate::protocol::{ClientMessage, ServerMessage};

use common::types::{EventId, SessionId, SubjectId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

/// Transport-neutral frame. The WebSocket handler maps these to and from
/// `axum` messages; tests drive them through in-memory channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer sent a close frame or the inbound stream ended.
    PeerClosed,
    /// Read or write failed, or a write exceeded its deadline.
    TransportError(String),
    /// No inbound frame within the liveness timeout.
    LivenessTimeout,
    /// The hub released the mailbox (unregistered or shut down).
    MailboxClosed,
    /// The hub stopped answering.
    HubUnavailable,
    RegistrationFailed(TicketError),
}

impl SessionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::PeerClosed => "peer_closed",
            SessionOutcome::TransportError(_) => "transport_error",
            SessionOutcome::LivenessTimeout => "liveness_timeout",
            SessionOutcome::MailboxClosed => "mailbox_closed",
            SessionOutcome::HubUnavailable => "hub_unavailable",
            SessionOutcome::RegistrationFailed(_) => "registration_failed",
        }
    }

    /// The failure this outcome represents, if the session did not end
    /// cleanly. Transport failures and liveness expiry are `Connection`.
    #[must_use]
    pub fn error(&self) -> Option<TicketError> {
        match self {
            SessionOutcome::PeerClosed | SessionOutcome::MailboxClosed => None,
            SessionOutcome::TransportError(reason) => Some(TicketError::Connection(reason.clone())),
            SessionOutcome::LivenessTimeout => {
                Some(TicketError::Connection("liveness timeout".to_string()))
            }
            SessionOutcome::HubUnavailable => {
                Some(TicketError::Internal("hub unavailable".to_string()))
            }
            SessionOutcome::RegistrationFailed(e) => Some(e.clone()),
        }
    }
}

type Replies = mpsc::WeakSender<Arc<ServerMessage>>;

pub struct Session {
    id: SessionId,
    subject: SubjectId,
    hub: HubHandle,
    config: SessionConfig,
    /// Local copy of this session's subscriptions; mirrors the hub index.
    subscriptions: HashSet<EventId>,
}

impl Session {
    #[must_use]
    pub fn new(subject: SubjectId, hub: HubHandle, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            subject,
            hub,
            config,
            subscriptions: HashSet::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Drive the session until it ends.
    #[instrument(skip_all, name = "ticket.session", fields(session_id = %self.id, subject = %self.subject))]
    pub async fn run<T, E>(mut self, transport: T) -> SessionOutcome
    where
        T: Sink<Frame> + Stream<Item = Result<Frame, E>>,
        <T as Sink<Frame>>::Error: Display,
        E: Display,
    {
        let (mailbox, outbox) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let replies = mailbox.downgrade();

        if let Err(e) = self.hub.register(self.id, self.subject, mailbox).await {
            warn!(target: "ticket.session", error = %e, "Session registration failed");
            return SessionOutcome::RegistrationFailed(e);
        }

        let (sink, stream) = transport.split::<Frame>();
        let config = self.config;

        let outcome = tokio::select! {
            outcome = self.read_pump(stream, &replies) => outcome,
            outcome = write_pump(sink, outbox, config) => outcome,
        };

        if let Err(e) = self.hub.unregister(self.id).await {
            warn!(target: "ticket.session", error = %e, "Session unregister failed");
        }

        match outcome.error() {
            Some(e) => info!(
                target: "ticket.session",
                outcome = outcome.as_str(),
                error = %e,
                subscriptions = self.subscriptions.len(),
                "Session ended"
            ),
            None => info!(
                target: "ticket.session",
                outcome = outcome.as_str(),
                subscriptions = self.subscriptions.len(),
                "Session ended"
            ),
        }
        outcome
    }

    async fn read_pump<St, E>(&mut self, mut stream: St, replies: &Replies) -> SessionOutcome
    where
        St: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
    {
        let mut deadline = Instant::now() + self.config.liveness_timeout;

        loop {
            let frame = match time::timeout_at(deadline, stream.next()).await {
                Err(_) => {
                    info!(target: "ticket.session", "Peer liveness timeout");
                    return SessionOutcome::LivenessTimeout;
                }
                Ok(None) => return SessionOutcome::PeerClosed,
                Ok(Some(Err(e))) => {
                    debug!(target: "ticket.session", error = %e, "Read failed");
                    return SessionOutcome::TransportError(e.to_string());
                }
                Ok(Some(Ok(frame))) => frame,
            };

            // Any inbound traffic proves the peer is alive.
            deadline = Instant::now() + self.config.liveness_timeout;

            match frame {
                Frame::Text(text) => {
                    if let Some(outcome) = self.handle_text(&text, replies).await {
                        return outcome;
                    }
                }
                Frame::Binary(_) => reply(replies, ServerMessage::error("Invalid message format")),
                // Transport pings are answered by the transport itself.
                Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Close => return SessionOutcome::PeerClosed,
            }
        }
    }

    /// Handle one text frame. Returns `Some` only when the session must end.
    async fn handle_text(&mut self, text: &str, replies: &Replies) -> Option<SessionOutcome> {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(target: "ticket.session", error = %e, "Rejected client message");
                reply(replies, ServerMessage::error(e.to_string()));
                return None;
            }
        };

        let result = match message {
            ClientMessage::Subscribe { event_id } => self
                .hub
                .subscribe(self.id, event_id)
                .await
                .map(|_| {
                    self.subscriptions.insert(event_id);
                }),
            ClientMessage::Unsubscribe { event_id } => self
                .hub
                .unsubscribe(self.id, event_id)
                .await
                .map(|_| {
                    self.subscriptions.remove(&event_id);
                }),
            ClientMessage::Ping => {
                reply(replies, ServerMessage::pong());
                Ok(())
            }
        };

        match result {
            Ok(()) => None,
            Err(TicketError::Internal(_)) => Some(SessionOutcome::HubUnavailable),
            Err(e) => {
                reply(replies, ServerMessage::error(e.client_message()));
                None
            }
        }
    }
}

/// Queue a direct reply. Dropped if the mailbox is full or already closed.
fn reply(replies: &Replies, message: ServerMessage) {
    let Some(mailbox) = replies.upgrade() else {
        return;
    };
    if mailbox.try_send(Arc::new(message)).is_err() {
        warn!(target: "ticket.session", "Reply dropped, mailbox full or closed");
    }
}

async fn write_pump<Si>(
    mut sink: Si,
    mut outbox: mpsc::Receiver<Arc<ServerMessage>>,
    config: SessionConfig,
) -> SessionOutcome
where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    let mut ticker = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);

    loop {
        tokio::select! {
            msg = outbox.recv() => {
                let Some(message) = msg else {
                    // Best effort; the peer may already be gone.
                    let _ = time::timeout(config.write_timeout, sink.send(Frame::Close)).await;
                    return SessionOutcome::MailboxClosed;
                };
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(target: "ticket.session", error = %e, kind = message.kind(), "Failed to encode message");
                        continue;
                    }
                };
                if let Err(outcome) = write_frame(&mut sink, Frame::Text(text), &config).await {
                    return outcome;
                }
            }

            _ = ticker.tick() => {
                if let Err(outcome) = write_frame(&mut sink, Frame::Ping(Vec::new()), &config).await {
                    return outcome;
                }
            }
        }
    }
}

async fn write_frame<Si>(sink: &mut Si, frame: Frame, config: &SessionConfig) -> Result<(), SessionOutcome>
where
    Si: Sink<Frame> + Unpin,
    Si::Error: Display,
{
    match time::timeout(config.write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(target: "ticket.session", error = %e, "Write failed");
            Err(SessionOutcome::TransportError(e.to_string()))
        }
        Err(_) => {
            debug!(target: "ticket.session", "Write deadline exceeded");
            Err(SessionOutcome::TransportError("write timeout".to_string()))
        }
    }
}
