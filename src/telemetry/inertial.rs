//! Inertial-sensor telemetry (accelerometer + gyroscope)
//!
//! The board sends one JSON datagram per sample:
//!
//! ```json
//! {"seq": 17, "t_ms": 52310, "9dof": {"accel": [120, -40, 16384], "gyro": [3, 0, -131]}}
//! ```
//!
//! Raw triads are sensor counts. They are converted with the scale factors
//! of the configured sensor range (defaults: +/-2 g and +/-250 dps).
//!
//! A triad may carry more than three values (some firmware appends a
//! temperature word); only the first three are read. Fewer than three is
//! rejected, while a missing triad reads as zeros.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::format::{PacketError, TelemetryFormat};
use super::store::TelemetryStore;

/// Store section the converted readings are published under
pub const INERTIAL_SECTION: &str = "9dof";

/// Accelerometer counts per g at the +/-2 g range
pub const DEFAULT_ACCEL_LSB_PER_G: f64 = 16384.0;
/// Gyroscope counts per degree per second at the +/-250 dps range
pub const DEFAULT_GYRO_LSB_PER_DPS: f64 = 131.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    fn scaled(raw: [f64; 3], lsb_per_unit: f64, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        let convert = |count: f64| (count / lsb_per_unit * factor).round() / factor;
        Self {
            x: convert(raw[0]),
            y: convert(raw[1]),
            z: convert(raw[2]),
        }
    }
}

/// One converted sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InertialSample {
    /// Sender sequence number; samples without one skip loss accounting
    pub seq: Option<u32>,
    /// Board timestamp in milliseconds
    pub t_ms: Option<u64>,
    /// g
    pub acceleration: Vector3,
    /// degrees per second
    pub gyroscope: Vector3,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    seq: Option<u32>,
    t_ms: Option<u64>,
    #[serde(rename = "9dof", default)]
    nine_dof: RawNineDof,
}

#[derive(Debug, Default, Deserialize)]
struct RawNineDof {
    #[serde(default)]
    accel: Option<Vec<f64>>,
    #[serde(default)]
    gyro: Option<Vec<f64>>,
}

/// First three counts of a triad, zeros when it is absent
fn triad(name: &str, values: Option<Vec<f64>>) -> Result<[f64; 3], PacketError> {
    match values.as_deref() {
        None => Ok([0.0; 3]),
        Some([x, y, z, ..]) => Ok([*x, *y, *z]),
        Some(short) => Err(PacketError::Malformed(format!(
            "{} needs 3 values, got {}",
            name,
            short.len()
        ))),
    }
}

/// Decoder for the inertial JSON datagrams
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialFormat {
    /// Accelerometer counts per g
    pub accel_lsb_per_g: f64,
    /// Gyroscope counts per degree per second
    pub gyro_lsb_per_dps: f64,
}

impl Default for InertialFormat {
    fn default() -> Self {
        Self {
            accel_lsb_per_g: DEFAULT_ACCEL_LSB_PER_G,
            gyro_lsb_per_dps: DEFAULT_GYRO_LSB_PER_DPS,
        }
    }
}

impl InertialFormat {
    /// Creates a format for a sensor configured to a non-default range.
    ///
    /// Both factors are sensor counts per physical unit, as listed in the
    /// sensor datasheet for the selected full-scale range. They must be
    /// positive; the station config rejects anything else before a format
    /// is built.
    ///
    /// # Examples
    ///
    /// ```
    /// use rovlink::telemetry::{InertialFormat, TelemetryFormat};
    ///
    /// // +/-4 g and +/-500 dps
    /// let format = InertialFormat::new(8192.0, 65.5);
    /// let sample = format
    ///     .decode(br#"{"9dof": {"accel": [8192, 0, 0], "gyro": [0, 131, 0]}}"#)
    ///     .unwrap();
    /// assert_eq!(sample.acceleration.x, 1.0);
    /// assert_eq!(sample.gyroscope.y, 2.0);
    /// ```
    pub fn new(accel_lsb_per_g: f64, gyro_lsb_per_dps: f64) -> Self {
        Self {
            accel_lsb_per_g,
            gyro_lsb_per_dps,
        }
    }
}

impl TelemetryFormat for InertialFormat {
    type Record = InertialSample;

    fn name(&self) -> &'static str {
        "inertial"
    }

    fn decode(&self, datagram: &[u8]) -> Result<InertialSample, PacketError> {
        let raw: RawMessage =
            serde_json::from_slice(datagram).map_err(|e| PacketError::Malformed(e.to_string()))?;

        let accel = triad("accel", raw.nine_dof.accel)?;
        let gyro = triad("gyro", raw.nine_dof.gyro)?;

        Ok(InertialSample {
            seq: raw.seq,
            t_ms: raw.t_ms,
            acceleration: Vector3::scaled(accel, self.accel_lsb_per_g, 4),
            gyroscope: Vector3::scaled(gyro, self.gyro_lsb_per_dps, 2),
        })
    }

    fn sequence(&self, record: &InertialSample) -> Option<u32> {
        record.seq
    }

    fn publish(&self, record: &InertialSample, store: &dyn TelemetryStore) {
        // The magnetometer is fed by another source; keep whatever is there
        let magnetometer = store
            .read_section(INERTIAL_SECTION)
            .get("magnetometer")
            .cloned()
            .unwrap_or_else(|| json!({"x": 0, "y": 0, "z": 0}));

        let section: Value = json!({
            "acceleration": record.acceleration,
            "gyroscope": record.gyroscope,
            "magnetometer": magnetometer,
        });
        store.update(json!({ INERTIAL_SECTION: section }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::store::MemoryStore;

    #[test]
    fn test_converts_to_physical_units() {
        let datagram = br#"{"seq": 17, "t_ms": 52310, "9dof": {"accel": [16384, -8192, 1000], "gyro": [131, -262, 100]}}"#;
        let sample = InertialFormat::default().decode(datagram).unwrap();

        assert_eq!(sample.seq, Some(17));
        assert_eq!(sample.t_ms, Some(52310));
        assert_eq!(
            sample.acceleration,
            Vector3 {
                x: 1.0,
                y: -0.5,
                z: 0.061
            }
        );
        assert_eq!(
            sample.gyroscope,
            Vector3 {
                x: 1.0,
                y: -2.0,
                z: 0.76
            }
        );
    }

    #[test]
    fn test_missing_triads_default_to_zero() {
        let sample = InertialFormat::default()
            .decode(br#"{"seq": 1}"#)
            .unwrap();
        assert_eq!(sample.acceleration, Vector3::default());
        assert_eq!(sample.gyroscope, Vector3::default());
        assert_eq!(sample.t_ms, None);
    }

    #[test]
    fn test_custom_scale() {
        let format = InertialFormat::new(8192.0, 65.5);
        let sample = format
            .decode(br#"{"9dof": {"accel": [8192, 0, 0], "gyro": [655, 0, 0]}}"#)
            .unwrap();
        assert_eq!(sample.acceleration.x, 1.0);
        assert_eq!(sample.gyroscope.x, 10.0);
        assert_eq!(sample.seq, None);
    }

    #[test]
    fn test_long_triads_use_first_three_values() {
        let sample = InertialFormat::default()
            .decode(br#"{"seq": 3, "9dof": {"accel": [16384, 0, -16384, 2750], "gyro": [262, 131, 0, 7, 9]}}"#)
            .unwrap();
        assert_eq!(
            sample.acceleration,
            Vector3 {
                x: 1.0,
                y: 0.0,
                z: -1.0
            }
        );
        assert_eq!(
            sample.gyroscope,
            Vector3 {
                x: 2.0,
                y: 1.0,
                z: 0.0
            }
        );
    }

    #[test]
    fn test_short_triads_are_malformed() {
        for datagram in [
            &br#"{"9dof": {"accel": [1, 2], "gyro": [0, 0, 0]}}"#[..],
            &br#"{"9dof": {"accel": [0, 0, 0], "gyro": []}}"#[..],
            &br#"{"9dof": {"gyro": [5]}}"#[..],
        ] {
            assert!(matches!(
                InertialFormat::default().decode(datagram),
                Err(PacketError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_bad_json_is_malformed() {
        for datagram in [&b"not json"[..], &b"{\"seq\": -4}"[..], &b""[..]] {
            assert!(matches!(
                InertialFormat::default().decode(datagram),
                Err(PacketError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_publish_keeps_magnetometer() {
        let store = MemoryStore::with_document(json!({
            "9dof": {"magnetometer": {"x": 21.5, "y": -3.0, "z": 40.0}}
        }));
        let format = InertialFormat::default();
        let sample = format
            .decode(br#"{"seq": 2, "9dof": {"accel": [0, 0, 16384], "gyro": [0, 0, 0]}}"#)
            .unwrap();
        format.publish(&sample, &store);

        let section = store.read_section(INERTIAL_SECTION);
        assert_eq!(section["acceleration"]["z"], 1.0);
        assert_eq!(section["magnetometer"]["x"], 21.5);
    }

    #[test]
    fn test_publish_defaults_magnetometer() {
        let store = MemoryStore::new();
        let format = InertialFormat::default();
        let sample = format.decode(br#"{"seq": 2}"#).unwrap();
        format.publish(&sample, &store);
        assert_eq!(
            store.read_section(INERTIAL_SECTION)["magnetometer"],
            json!({"x": 0, "y": 0, "z": 0})
        );
    }
}
