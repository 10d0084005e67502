//! Per-source telemetry packet formats
//!
//! A receiver is generic over one [`TelemetryFormat`]: the format turns a
//! datagram into a validated record, names its sequence number and knows
//! which store section the record is published to.

use std::fmt::Debug;

use serde::Serialize;

use super::store::TelemetryStore;

/// Why a single datagram was discarded
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet size: {actual} bytes (expected {expected})")]
    WrongSize { expected: usize, actual: usize },

    #[error("CRC mismatch: computed 0x{computed:08X}, received 0x{received:08X}")]
    CrcMismatch { computed: u32, received: u32 },

    #[error("Malformed packet: {0}")]
    Malformed(String),
}

/// One telemetry source's datagram format.
///
/// Implementations are stateless apart from their settings; all counters
/// and the last record live in the receiver.
///
/// # Examples
///
/// ```rust
/// use rovlink::telemetry::{PacketError, TelemetryFormat, TelemetryStore};
/// use serde_json::json;
///
/// /// Single-byte depth gauge reading in decimetres
/// struct DepthGauge;
///
/// impl TelemetryFormat for DepthGauge {
///     type Record = u8;
///
///     fn name(&self) -> &'static str {
///         "depth"
///     }
///
///     fn decode(&self, datagram: &[u8]) -> Result<u8, PacketError> {
///         match datagram {
///             [value] => Ok(*value),
///             other => Err(PacketError::WrongSize { expected: 1, actual: other.len() }),
///         }
///     }
///
///     fn sequence(&self, _record: &u8) -> Option<u32> {
///         None
///     }
///
///     fn publish(&self, record: &u8, store: &dyn TelemetryStore) {
///         store.update(json!({"depth": {"dpt": f64::from(*record) / 10.0}}));
///     }
/// }
/// ```
pub trait TelemetryFormat: Send + Sync + 'static {
    type Record: Clone + Debug + Send + Sync + Serialize + 'static;

    /// Short name used in logs and thread/task names
    fn name(&self) -> &'static str;

    fn decode(&self, datagram: &[u8]) -> Result<Self::Record, PacketError>;

    /// Sequence number used for loss detection, if the record carries one
    fn sequence(&self, record: &Self::Record) -> Option<u32>;

    /// Merges an accepted record into the shared store
    fn publish(&self, record: &Self::Record, store: &dyn TelemetryStore);
}
