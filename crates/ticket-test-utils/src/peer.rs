//! In-memory transport for driving a `Session` without a socket.
//!
//! `TestPeer::pair()` returns the client half and a `PeerTransport` that the
//! session consumes. Frames written by the session arrive at the peer in
//! order; frames sent by the peer arrive at the session in order.

use common::types::{SessionId, SubjectId};
use futures::channel::mpsc;
use futures::{Sink, Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use ticket_service::config::{SessionConfig, DEFAULT_HUB_QUEUE_CAPACITY};
use ticket_service::hub::HubHandle;
use ticket_service::protocol::ServerMessage;
use ticket_service::session::{Frame, Session, SessionOutcome};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `expect_message` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffer used by `TestPeer::pair()`; large enough that writes never block.
const DEFAULT_PEER_BUFFER: usize = 1024;

/// Transport error injected by the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerError(pub String);

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer error: {}", self.0)
    }
}

/// Session-side half of the pair.
pub struct PeerTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, PeerError>>,
    outbound: mpsc::Sender<Frame>,
}

impl Stream for PeerTransport {
    type Item = Result<Frame, PeerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inbound.poll_next_unpin(cx)
    }
}

impl Sink<Frame> for PeerTransport {
    type Error = mpsc::SendError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::poll_ready(Pin::new(&mut self.get_mut().outbound), cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        Sink::start_send(Pin::new(&mut self.get_mut().outbound), item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::poll_flush(Pin::new(&mut self.get_mut().outbound), cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Sink::poll_close(Pin::new(&mut self.get_mut().outbound), cx)
    }
}

/// Client-side half of the pair.
pub struct TestPeer {
    to_session: mpsc::UnboundedSender<Result<Frame, PeerError>>,
    from_session: mpsc::Receiver<Frame>,
}

impl TestPeer {
    pub fn pair() -> (TestPeer, PeerTransport) {
        Self::pair_with_buffer(DEFAULT_PEER_BUFFER)
    }

    /// A pair whose session-to-peer direction holds at most `buffer + 1`
    /// unread frames. Writes beyond that block until the peer reads.
    pub fn pair_with_buffer(buffer: usize) -> (TestPeer, PeerTransport) {
        let (to_session, inbound) = mpsc::unbounded();
        let (outbound, from_session) = mpsc::channel(buffer);
        (
            TestPeer {
                to_session,
                from_session,
            },
            PeerTransport { inbound, outbound },
        )
    }

    pub fn send_frame(&self, frame: Frame) {
        let _ = self.to_session.unbounded_send(Ok(frame));
    }

    pub fn send_text(&self, text: &str) {
        self.send_frame(Frame::Text(text.to_string()));
    }

    pub fn send_json(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    pub fn inject_error(&self, message: &str) {
        let _ = self
            .to_session
            .unbounded_send(Err(PeerError(message.to_string())));
    }

    /// Send a close frame.
    pub fn close(&self) {
        self.send_frame(Frame::Close);
    }

    /// End the inbound stream without a close frame.
    pub fn hang_up(&mut self) {
        self.to_session.close_channel();
    }

    /// Next raw frame, or `None` once the session dropped its transport.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.from_session.next().await
    }

    /// Next application message, skipping transport pings and pongs.
    /// `None` on a close frame or when the transport ends.
    pub async fn next_message(&mut self) -> Option<Value> {
        loop {
            match self.next_frame().await? {
                Frame::Text(text) => {
                    return Some(serde_json::from_str(&text).expect("server sent invalid JSON"));
                }
                Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Binary(_) => panic!("server sent a binary frame"),
                Frame::Close => return None,
            }
        }
    }

    /// Next application message; fails the test on timeout or close.
    pub async fn expect_message(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.next_message())
            .await
            .expect("timed out waiting for a server message")
            .expect("session closed while waiting for a message")
    }

    /// Wait for the session to close its side.
    ///
    /// Returns the application messages received before the close.
    pub async fn expect_closed(&mut self) -> Vec<Value> {
        let mut seen = Vec::new();
        tokio::time::timeout(RECV_TIMEOUT, async {
            while let Some(message) = self.next_message().await {
                seen.push(message);
            }
        })
        .await
        .expect("timed out waiting for the session to close");
        seen
    }

    /// True if no application message is waiting right now.
    pub fn is_quiet(&mut self) -> bool {
        loop {
            match self.from_session.try_recv() {
                Ok(Frame::Ping(_) | Frame::Pong(_)) => {}
                Ok(_) => return false,
                Err(_) => return true,
            }
        }
    }
}

/// Session timings that stay out of the way of ordinary tests.
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        mailbox_capacity: 64,
        ..SessionConfig::default()
    }
}

pub fn spawn_hub() -> HubHandle {
    HubHandle::spawn(DEFAULT_HUB_QUEUE_CAPACITY, CancellationToken::new()).0
}

/// Start a session on its own task with an in-memory peer.
pub fn spawn_session(
    hub: &HubHandle,
    subject: SubjectId,
    config: SessionConfig,
) -> (TestPeer, SessionId, JoinHandle<SessionOutcome>) {
    let (peer, transport) = TestPeer::pair();
    let session = Session::new(subject, hub.clone(), config);
    let session_id = session.id();
    let task = tokio::spawn(session.run(transport));
    (peer, session_id, task)
}

/// Register a bare mailbox with the hub, bypassing `Session`.
pub async fn register_raw(
    hub: &HubHandle,
    subject: SubjectId,
    capacity: usize,
) -> (SessionId, tokio_mpsc::Receiver<Arc<ServerMessage>>) {
    let (tx, rx) = tokio_mpsc::channel(capacity);
    let session_id = SessionId::new();
    hub.register(session_id, subject, tx)
        .await
        .expect("register should succeed");
    (session_id, rx)
}

/// Poll the hub until it reports `expected` sessions.
pub async fn wait_for_session_count(hub: &HubHandle, expected: usize) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            let status = hub.status().await.expect("hub should be running");
            if status.session_count == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("hub session count never reached the expected value");
}
