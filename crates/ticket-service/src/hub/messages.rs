//! Operations accepted by the hub coordinator.
//!
//! Every registry or subscriber-index access goes through one of these
//! messages. Request-reply operations carry a `oneshot` response channel.

use crate::errors::TicketError;
use crate::protocol::ServerMessage;
use common::types::{EventId, SessionId, SubjectId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Outbound mailbox sender as held by the hub.
pub type Mailbox = mpsc::Sender<Arc<ServerMessage>>;

#[derive(Debug)]
pub enum HubMessage {
    /// Add a session and send it a connection acknowledgement.
    Register {
        session_id: SessionId,
        subject: SubjectId,
        mailbox: Mailbox,
        respond_to: oneshot::Sender<Result<(), TicketError>>,
    },

    /// Remove a session and every index entry that references it.
    ///
    /// Replies `true` if the session was present.
    Unregister {
        session_id: SessionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Replies `true` if the subscription set changed.
    Subscribe {
        session_id: SessionId,
        event_id: EventId,
        respond_to: oneshot::Sender<Result<bool, TicketError>>,
    },

    /// Replies `true` if the subscription set changed.
    Unsubscribe {
        session_id: SessionId,
        event_id: EventId,
        respond_to: oneshot::Sender<Result<bool, TicketError>>,
    },

    /// Fan out a message. Scoped messages reach only that event's subscribers.
    ///
    /// `respond_to` is `None` for fire-and-forget publishes.
    Broadcast {
        message: Arc<ServerMessage>,
        respond_to: Option<oneshot::Sender<BroadcastReport>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<HubStatus>,
    },

    GetSubscribers {
        event_id: EventId,
        respond_to: oneshot::Sender<Vec<SessionId>>,
    },

    GetSession {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },
}

/// Outcome of a single fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions selected for delivery.
    pub recipients: usize,
    pub delivered: usize,
    /// Recipients whose mailbox was full.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStatus {
    pub session_count: usize,
    /// Events with at least one subscriber.
    pub subscribed_event_count: usize,
    /// Total (session, event) pairs in the index.
    pub subscription_count: usize,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
}

/// Hub-side view of one registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub subject: SubjectId,
    /// Sorted ascending.
    pub subscriptions: Vec<EventId>,
    /// Messages dropped for this session because its mailbox was full.
    pub dropped: u64,
}
