//! Resource-stats telemetry from the vehicle's microcontroller
//!
//! ```text
//! offset  type  field
//!  0      u32   sequence
//!  4      u32   uptime_ms
//!  8      u8    cpu_percent
//!  9      u8    heap_used_percent
//! 10      u16   heap_free_kb
//! 12      u16   heap_total_kb
//! 14      u8    thread_count
//! 15      u8    reserved
//! 16      u32   udp_rx_count
//! 20      u32   udp_rx_errors
//! 24      u32   crc32 over bytes 0..24
//! ```
//!
//! Network byte order throughout.

use serde::Serialize;
use serde_json::json;

use super::format::{PacketError, TelemetryFormat};
use super::store::TelemetryStore;
use crate::checksum;

/// Datagram length including the trailing CRC
pub const RESOURCE_PACKET_LEN: usize = 28;

/// Store section the stats are published under
pub const RESOURCE_SECTION: &str = "resources";

/// Health report of the vehicle's microcontroller.
///
/// Published to the store as-is under [`RESOURCE_SECTION`]; the reserved
/// byte of the wire format is not kept.
///
/// # Examples
///
/// ```
/// use rovlink::telemetry::{ResourceStats, ResourceStatsFormat, TelemetryFormat};
///
/// let stats = ResourceStats {
///     sequence: 7,
///     cpu_percent: 40,
///     ..ResourceStats::default()
/// };
/// let decoded = ResourceStatsFormat.decode(&stats.encode()).unwrap();
/// assert_eq!(decoded, stats);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    /// Incremented by the firmware for every report; restarts at 0 on reboot
    pub sequence: u32,
    /// Milliseconds since the firmware booted, wraps after ~49 days
    pub uptime_ms: u32,
    /// CPU load over the last report interval, 0-100
    pub cpu_percent: u8,
    /// Share of the heap in use, 0-100
    pub heap_used_percent: u8,
    pub heap_free_kb: u16,
    pub heap_total_kb: u16,
    /// Threads alive on the vehicle's RTOS
    pub thread_count: u8,
    /// Command datagrams the vehicle has received since boot
    pub udp_rx_count: u32,
    /// Command datagrams the vehicle dropped (bad size or CRC)
    pub udp_rx_errors: u32,
}

impl ResourceStats {
    /// Builds the datagram the firmware would send for these stats
    pub fn encode(&self) -> [u8; RESOURCE_PACKET_LEN] {
        let mut packet = [0u8; RESOURCE_PACKET_LEN];
        packet[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        packet[4..8].copy_from_slice(&self.uptime_ms.to_be_bytes());
        packet[8] = self.cpu_percent;
        packet[9] = self.heap_used_percent;
        packet[10..12].copy_from_slice(&self.heap_free_kb.to_be_bytes());
        packet[12..14].copy_from_slice(&self.heap_total_kb.to_be_bytes());
        packet[14] = self.thread_count;
        packet[16..20].copy_from_slice(&self.udp_rx_count.to_be_bytes());
        packet[20..24].copy_from_slice(&self.udp_rx_errors.to_be_bytes());
        let crc = checksum::crc32(&packet[..24]);
        packet[24..].copy_from_slice(&crc.to_be_bytes());
        packet
    }
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Decoder for the 28-byte CRC-protected resource datagram
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceStatsFormat;

impl TelemetryFormat for ResourceStatsFormat {
    type Record = ResourceStats;

    fn name(&self) -> &'static str {
        "resource"
    }

    fn decode(&self, datagram: &[u8]) -> Result<ResourceStats, PacketError> {
        if datagram.len() != RESOURCE_PACKET_LEN {
            return Err(PacketError::WrongSize {
                expected: RESOURCE_PACKET_LEN,
                actual: datagram.len(),
            });
        }
        if let Some((computed, received)) = checksum::verify_trailing_be(datagram) {
            if computed != received {
                return Err(PacketError::CrcMismatch { computed, received });
            }
        }

        Ok(ResourceStats {
            sequence: be_u32(datagram, 0),
            uptime_ms: be_u32(datagram, 4),
            cpu_percent: datagram[8],
            heap_used_percent: datagram[9],
            heap_free_kb: be_u16(datagram, 10),
            heap_total_kb: be_u16(datagram, 12),
            thread_count: datagram[14],
            udp_rx_count: be_u32(datagram, 16),
            udp_rx_errors: be_u32(datagram, 20),
        })
    }

    fn sequence(&self, record: &ResourceStats) -> Option<u32> {
        Some(record.sequence)
    }

    fn publish(&self, record: &ResourceStats, store: &dyn TelemetryStore) {
        store.update(json!({ RESOURCE_SECTION: record }));
    }
}
