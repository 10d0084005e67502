//! Inbound telemetry path: vehicle → station
//!
//! ```text
//! UDP ──► TelemetryReceiver<F> ──validate──► ReceiverStats (latest + counters)
//!                                   └──publish──► TelemetryStore ──► display / API
//!                                                       └──► RecordForwarder ──► UDP (codec record)
//! UDP (codec record) ──► TelemetryReceiver<CodecRecordFormat> ──► store "record" section
//! ```
//!
//! - [`format`] - the per-source packet contract receivers are generic over
//! - [`resource`] / [`inertial`] - the two vehicle telemetry formats
//! - [`receiver`] - socket, receive task and loss accounting
//! - [`store`] - shared key-sectioned document
//! - [`codec`] - fixed-width little-endian record for constrained consumers
//! - [`forwarder`] - periodic sender of codec records
//! - [`record`] - receiving side of the codec record

pub mod codec;
pub mod format;
pub mod forwarder;
pub mod inertial;
pub mod receiver;
pub mod record;
pub mod resource;
pub mod store;

pub use codec::{CodecError, TelemetryCodec};
pub use format::{PacketError, TelemetryFormat};
pub use forwarder::RecordForwarder;
pub use inertial::{InertialFormat, InertialSample};
pub use receiver::{ReceiverError, ReceiverStats, TelemetryReceiver};
pub use record::{CodecRecordFormat, RECORD_SECTION};
pub use resource::{ResourceStats, ResourceStatsFormat};
pub use store::{MemoryStore, TelemetryStore};
