//! Outbound command path: station → vehicle
//!
//! ```text
//! Controller / API ──set_*──► CommandSink ──(fixed rate)──► UDP ──► motor controller
//! ```
//!
//! 1. [`model`] - Command state and the bias-encoded wire packet
//! 2. [`channel`] - Fixed-rate UDP sender owning one command instance
//! 3. [`recording`] - Socket-less sink that records every update
//!
//! Everything that produces commands talks to a [`CommandSink`], so the
//! controller and any external command intake never depend on the concrete
//! transport.

pub mod channel;
pub mod model;
pub mod recording;

use serde::Serialize;
use std::future::Future;

pub use channel::{ChannelError, CommandChannel};
pub use model::{build_packet, Command, Field, PACKET_LEN, PAYLOAD_LEN};
pub use recording::{RecordingSink, DEFAULT_HISTORY_LEN};

/// Point-in-time copy of a sink's state for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandSnapshot {
    pub command: Command,
    /// Sequence number the next transmitted packet will carry
    pub sequence: u32,
    pub packets_sent: u64,
    /// Failed socket sends; the stream continues past them
    pub send_errors: u64,
}

/// Anything that accepts command updates and owns their delivery.
///
/// Setters are synchronous and cheap so they can be called from a
/// real-time polling thread; lifecycle methods are async because they
/// manage sockets and worker tasks.
pub trait CommandSink: Send + Sync + 'static {
    /// Starts delivery. Calling it on a running sink does nothing.
    fn start(&self) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Stops delivery. Safe to call repeatedly or on a sink that never started.
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Sets the named fields in integer units, saturating out-of-range values
    fn set_command(&self, values: &[(Field, i32)]);

    /// Sets the named fields from normalized inputs
    fn set_from_axes(&self, axes: &[(Field, f32)]);

    fn get_command(&self) -> CommandSnapshot;
}
