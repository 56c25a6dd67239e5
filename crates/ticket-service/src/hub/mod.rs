//! Connection hub: session registry, per-event subscriber index, and fan-out.
//!
//! ```text
//! Session ──┐                       ┌──> mailbox (session A)
//! Session ──┼──> HubHandle ──> HubCoordinator ──> mailbox (session B)
//! Booking ──┘      (mpsc)                └──> mailbox (session C)
//! ```
//!
//! Operations from one handle are processed in submission order.

pub mod coordinator;
pub mod messages;
pub mod metrics;

pub use coordinator::{HubHandle, PublishSlot};
pub use messages::{BroadcastReport, HubStatus, Mailbox, SessionInfo};
pub use metrics::HubMetrics;
