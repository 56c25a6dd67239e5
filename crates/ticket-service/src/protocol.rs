//! Wire vocabulary between viewer sessions and the hub.
//!
//! Every frame carries exactly one JSON object.
//!
//! Server to client: `{type, event_id?, timestamp, data}` where `type` is one
//! of `connection_ack`, `availability_update`, `error`, `pong`.
//!
//! Client to server: `{type, event_id?}` where `type` is one of `subscribe`,
//! `unsubscribe`, `ping`.

use chrono::{DateTime, Utc};
use common::types::{EventId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Acknowledgement text sent on every successful registration.
pub const CONNECTION_ACK_MESSAGE: &str = "Connected successfully";

// =============================================================================
// Server -> client
// =============================================================================

/// A message pushed from the hub (or a session) to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub payload: ServerPayload,

    /// Scope of the message. `None` means it is not tied to one event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,

    pub timestamp: DateTime<Utc>,
}

/// Closed set of server message bodies, serialized as `type` + `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerPayload {
    ConnectionAck(ConnectionAck),
    AvailabilityUpdate(AvailabilityUpdate),
    Error(ErrorBody),
    Pong(PongBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionAck {
    pub client_id: SessionId,
    pub message: String,
}

/// Availability snapshot as seen by viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    pub event_id: EventId,
    pub available_tickets: u32,
    pub capacity: u32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PongBody {}

impl ServerMessage {
    fn new(payload: ServerPayload, event_id: Option<EventId>) -> Self {
        Self {
            payload,
            event_id,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn connection_ack(client_id: SessionId) -> Self {
        Self::new(
            ServerPayload::ConnectionAck(ConnectionAck {
                client_id,
                message: CONNECTION_ACK_MESSAGE.to_string(),
            }),
            None,
        )
    }

    /// Availability update scoped to the snapshot's event.
    #[must_use]
    pub fn availability_update(update: AvailabilityUpdate) -> Self {
        let event_id = update.event_id;
        Self::new(ServerPayload::AvailabilityUpdate(update), Some(event_id))
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            ServerPayload::Error(ErrorBody {
                message: message.into(),
            }),
            None,
        )
    }

    #[must_use]
    pub fn pong() -> Self {
        Self::new(ServerPayload::Pong(PongBody::default()), None)
    }

    /// Wire name of the payload, used for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.payload {
            ServerPayload::ConnectionAck(_) => "connection_ack",
            ServerPayload::AvailabilityUpdate(_) => "availability_update",
            ServerPayload::Error(_) => "error",
            ServerPayload::Pong(_) => "pong",
        }
    }

    /// Encode as a single JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error; not expected for these types.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Client -> server
// =============================================================================

/// Which subscription request lacked an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionKind {
    fn noun(self) -> &'static str {
        match self {
            SubscriptionKind::Subscribe => "subscription",
            SubscriptionKind::Unsubscribe => "unsubscription",
        }
    }
}

/// Recoverable decode failure; reported back to the sender only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    Malformed,

    #[error("Event ID required for {}", .kind.noun())]
    MissingEventId { kind: SubscriptionKind },

    #[error("Unknown message type")]
    UnknownType(String),
}

/// A decoded request from a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe { event_id: EventId },
    Unsubscribe { event_id: EventId },
    Ping,
}

#[derive(Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event_id: Option<EventId>,
}

impl ClientMessage {
    /// Decode one text frame.
    ///
    /// An `event_id` of 0 is treated as absent; identifiers start at 1.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for bad JSON, a missing `event_id` on a
    /// subscription request, or an unrecognised `type`.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawClientMessage =
            serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;

        let event_id = raw.event_id.filter(|id| id.0 != 0);

        match raw.kind.as_str() {
            "subscribe" => event_id
                .map(|event_id| ClientMessage::Subscribe { event_id })
                .ok_or(ProtocolError::MissingEventId {
                    kind: SubscriptionKind::Subscribe,
                }),
            "unsubscribe" => event_id
                .map(|event_id| ClientMessage::Unsubscribe { event_id })
                .ok_or(ProtocolError::MissingEventId {
                    kind: SubscriptionKind::Unsubscribe,
                }),
            "ping" => Ok(ClientMessage::Ping),
            _ => Err(ProtocolError::UnknownType(raw.kind)),
        }
    }
}
