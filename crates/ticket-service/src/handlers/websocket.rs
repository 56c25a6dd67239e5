//! `GET /ws?token=...` - upgrade to a live availability session.
//!
//! The credential is checked before the upgrade. A missing or invalid token
//! gets a plain 401 and no socket is ever opened.

use crate::routes::AppState;
use crate::session::{Frame, Session};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
}

#[instrument(skip_all, name = "ticket.ws.upgrade")]
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = params.token.as_deref().unwrap_or_default();
    let subject = match state.authenticator.authenticate(token) {
        Ok(subject) => subject,
        Err(e) => {
            debug!(target: "ticket.ws", "Rejected connection before upgrade");
            return e.into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = state.hub.clone();
    let config = state.session_config;

    ws.max_message_size(config.max_message_bytes)
        .max_frame_size(config.max_message_bytes)
        .on_upgrade(move |socket| async move {
            let session = Session::new(subject, hub, config);
            let session_id = session.id();
            let outcome = session.run(frames(socket)).await;
            debug!(
                target: "ticket.ws",
                session_id = %session_id,
                outcome = ?outcome,
                "Socket closed"
            );
        })
}

/// Present a socket as a `Frame` sink and stream.
fn frames(
    socket: WebSocket,
) -> impl Sink<Frame, Error = axum::Error> + Stream<Item = Result<Frame, axum::Error>> + Send {
    socket
        .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))))
        .map(|message| message.map(from_message))
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Ping(bytes) => Message::Ping(bytes),
        Frame::Pong(bytes) => Message::Pong(bytes),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text),
        Message::Binary(bytes) => Frame::Binary(bytes),
        Message::Ping(bytes) => Frame::Ping(bytes),
        Message::Pong(bytes) => Frame::Pong(bytes),
        Message::Close(_) => Frame::Close,
    }
}
