//! Inbound codec records
//!
//! The same 85-byte little-endian record the [`RecordForwarder`] sends can
//! also arrive from the network, for instance from another station relaying
//! a vehicle it is connected to. [`CodecRecordFormat`] plugs the codec into a
//! [`TelemetryReceiver`] so those records land in the store.
//!
//! Records carry no sequence number and no checksum, so the receiver only
//! counts them; size is the single validity check.
//!
//! [`RecordForwarder`]: super::forwarder::RecordForwarder
//! [`TelemetryReceiver`]: super::receiver::TelemetryReceiver

use serde_json::{json, Value};

use super::codec::{CodecError, TelemetryCodec};
use super::format::{PacketError, TelemetryFormat};
use super::store::TelemetryStore;

/// Store section decoded records are published under
pub const RECORD_SECTION: &str = "record";

/// Decodes codec records into the nested telemetry document.
///
/// The decoded document is published as a whole under [`RECORD_SECTION`],
/// so relayed values never overwrite the sections filled by this station's
/// own receivers.
///
/// # Examples
///
/// ```
/// use rovlink::telemetry::{CodecRecordFormat, MemoryStore, TelemetryCodec, TelemetryFormat, TelemetryStore};
/// use serde_json::json;
///
/// let record = TelemetryCodec::new().encode(&json!({"battery": 14.5}));
/// let format = CodecRecordFormat::new();
/// let decoded = format.decode(&record).unwrap();
///
/// let store = MemoryStore::new();
/// format.publish(&decoded, &store);
/// assert_eq!(store.read_section("record")["battery"], 14.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodecRecordFormat {
    codec: TelemetryCodec,
}

impl CodecRecordFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact datagram length accepted by [`decode`](TelemetryFormat::decode)
    pub fn record_size(&self) -> usize {
        self.codec.record_size()
    }
}

impl TelemetryFormat for CodecRecordFormat {
    type Record = Value;

    fn name(&self) -> &'static str {
        "record"
    }

    fn decode(&self, datagram: &[u8]) -> Result<Value, PacketError> {
        self.codec.decode(datagram).map_err(|e| match e {
            CodecError::SizeMismatch { expected, actual } => {
                PacketError::WrongSize { expected, actual }
            }
        })
    }

    fn sequence(&self, _record: &Value) -> Option<u32> {
        None
    }

    fn publish(&self, record: &Value, store: &dyn TelemetryStore) {
        store.update(json!({ RECORD_SECTION: record }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::store::MemoryStore;

    fn source() -> Value {
        json!({
            "Thrust": [0.5, 0.0, -0.25, 0.0, 0.0, 1.0],
            "Buttons": {"button_surface": 3},
            "thrusters": {
                "front_left": {"power": 10.0, "temp": 30.0},
                "front_right": {"power": 20.0, "temp": 40.0}
            },
            "lights": {"front": 0.5, "rear": 1.0},
            "battery": 15.5,
            "depth": {"dpt": 4.0, "dptSet": 5.0}
        })
    }

    #[test]
    fn test_decodes_forwarded_record() {
        let format = CodecRecordFormat::new();
        let record = TelemetryCodec::new().encode(&source());
        assert_eq!(record.len(), format.record_size());

        let decoded = format.decode(&record).unwrap();
        assert_eq!(decoded["Thrust"][0], 0.5);
        assert_eq!(decoded["Buttons"]["button_surface"], 3);
        assert_eq!(decoded["thrusters"]["average"]["power"], 15.0);
        assert_eq!(decoded["lights"]["average"], 0.75);
        assert_eq!(decoded["depth"]["dptSet"], 5.0);
        assert_eq!(format.sequence(&decoded), None);
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let format = CodecRecordFormat::new();
        let record = TelemetryCodec::new().encode(&source());
        assert_eq!(
            format.decode(&record[..84]),
            Err(PacketError::WrongSize {
                expected: 85,
                actual: 84
            })
        );
        let mut long = record.clone();
        long.push(0);
        assert!(matches!(
            format.decode(&long),
            Err(PacketError::WrongSize { actual: 86, .. })
        ));
        assert!(format.decode(&[]).is_err());
    }

    #[test]
    fn test_publish_keeps_live_sections() {
        let store = MemoryStore::with_document(json!({"battery": 16.0}));
        let format = CodecRecordFormat::new();
        let decoded = format
            .decode(&TelemetryCodec::new().encode(&source()))
            .unwrap();
        format.publish(&decoded, &store);

        assert_eq!(store.read_section("battery"), 16.0);
        assert_eq!(store.read_section(RECORD_SECTION)["battery"], 15.5);
    }
}
