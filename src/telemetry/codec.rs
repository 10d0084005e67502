//! Telemetry Codec - structured telemetry <-> fixed-width binary record
//!
//! The record feeds a bandwidth-constrained consumer that only takes one
//! scalar per category. Multi-unit categories (thrusters, lights) are
//! reduced to their arithmetic mean on encode, and decode reports that mean
//! under an `"average"` key. Per-unit values cannot be recovered: the
//! transform is lossy on purpose.
//!
//! Layout (little-endian, 85 bytes):
//!
//! ```text
//! f32 x6  thrust x, y, z, pitch, roll, yaw      <- "Thrust"[0..6]
//! u8      button mask                           <- "Buttons"."button_surface"
//! f32 x2  thruster power / temp (mean)          <- "thrusters".*.power / .temp
//! f32 x9  accel xyz, gyro xyz, mag xyz          <- "9dof".acceleration/gyroscope/magnetometer
//! f32     lights (mean)                         <- "lights".*
//! f32     battery                               <- "battery"
//! f32 x2  depth current / target                <- "depth".dpt / .dptSet
//! ```

use serde_json::{Map, Value};

/// Top-level store sections the encoder reads
pub const SOURCE_SECTIONS: [&str; 7] = [
    "Thrust", "Buttons", "thrusters", "9dof", "lights", "battery", "depth",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    F32,
    U8,
}

impl NumericKind {
    pub fn width(self) -> usize {
        match self {
            NumericKind::F32 => 4,
            NumericKind::U8 => 1,
        }
    }
}

/// Where a field's value comes from in the source document
#[derive(Debug, Clone, Copy)]
enum Source {
    /// Positional element of an array section
    Index(&'static str, usize),
    /// Nested scalar
    Path(&'static [&'static str]),
    /// Mean of `key` over every object entry of a map section
    MeanOf(&'static str, &'static str),
    /// Mean of every numeric value of a map section
    MeanValues(&'static str),
}

/// Where a decoded value is written in the reconstructed document
#[derive(Debug, Clone, Copy)]
enum Target {
    Slot(&'static str, usize),
    At(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    kind: NumericKind,
    default: f64,
    source: Source,
    target: Target,
}

const fn float(name: &'static str, source: Source, target: Target) -> FieldSpec {
    FieldSpec {
        name,
        kind: NumericKind::F32,
        default: 0.0,
        source,
        target,
    }
}

const fn sensor(name: &'static str, path: &'static [&'static str]) -> FieldSpec {
    float(name, Source::Path(path), Target::At(path))
}

const LAYOUT: [FieldSpec; 22] = [
    float("thrust_x", Source::Index("Thrust", 0), Target::Slot("Thrust", 0)),
    float("thrust_y", Source::Index("Thrust", 1), Target::Slot("Thrust", 1)),
    float("thrust_z", Source::Index("Thrust", 2), Target::Slot("Thrust", 2)),
    float("thrust_pitch", Source::Index("Thrust", 3), Target::Slot("Thrust", 3)),
    float("thrust_roll", Source::Index("Thrust", 4), Target::Slot("Thrust", 4)),
    float("thrust_yaw", Source::Index("Thrust", 5), Target::Slot("Thrust", 5)),
    FieldSpec {
        name: "button_surface",
        kind: NumericKind::U8,
        default: 0.0,
        source: Source::Path(&["Buttons", "button_surface"]),
        target: Target::At(&["Buttons", "button_surface"]),
    },
    float(
        "thruster_power_avg",
        Source::MeanOf("thrusters", "power"),
        Target::At(&["thrusters", "average", "power"]),
    ),
    float(
        "thruster_temp_avg",
        Source::MeanOf("thrusters", "temp"),
        Target::At(&["thrusters", "average", "temp"]),
    ),
    sensor("accel_x", &["9dof", "acceleration", "x"]),
    sensor("accel_y", &["9dof", "acceleration", "y"]),
    sensor("accel_z", &["9dof", "acceleration", "z"]),
    sensor("gyro_x", &["9dof", "gyroscope", "x"]),
    sensor("gyro_y", &["9dof", "gyroscope", "y"]),
    sensor("gyro_z", &["9dof", "gyroscope", "z"]),
    sensor("mag_x", &["9dof", "magnetometer", "x"]),
    sensor("mag_y", &["9dof", "magnetometer", "y"]),
    sensor("mag_z", &["9dof", "magnetometer", "z"]),
    float(
        "lights_avg",
        Source::MeanValues("lights"),
        Target::At(&["lights", "average"]),
    ),
    float("battery", Source::Path(&["battery"]), Target::At(&["battery"])),
    float(
        "depth_current",
        Source::Path(&["depth", "dpt"]),
        Target::At(&["depth", "dpt"]),
    ),
    float(
        "depth_target",
        Source::Path(&["depth", "dptSet"]),
        Target::At(&["depth", "dptSet"]),
    ),
];

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(key))
}

impl Source {
    fn read(self, root: &Value) -> Option<f64> {
        match self {
            Source::Index(section, index) => root.get(section)?.get(index)?.as_f64(),
            Source::Path(path) => lookup(root, path)?.as_f64(),
            Source::MeanOf(section, key) => {
                let entries = root.get(section)?.as_object()?;
                Some(mean(
                    entries
                        .values()
                        .filter(|entry| entry.is_object())
                        .map(|entry| entry.get(key).and_then(Value::as_f64).unwrap_or(0.0)),
                ))
            }
            Source::MeanValues(section) => {
                let entries = root.get(section)?.as_object()?;
                Some(mean(entries.values().filter_map(Value::as_f64)))
            }
        }
    }
}

impl Target {
    fn write(self, root: &mut Map<String, Value>, value: Value) {
        match self {
            Target::Slot(section, index) => {
                let slot = root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = slot {
                    if items.len() <= index {
                        items.resize(index + 1, Value::Null);
                    }
                    items[index] = value;
                }
            }
            Target::At(path) => {
                let Some((last, parents)) = path.split_last() else {
                    return;
                };
                let parent = parents.iter().try_fold(root, |node, key| {
                    node.entry(key.to_string())
                        .or_insert_with(|| Value::Object(Map::new()))
                        .as_object_mut()
                });
                if let Some(parent) = parent {
                    parent.insert(last.to_string(), value);
                }
            }
        }
    }
}

/// Fixed-layout encoder/decoder; the record size is computed once
#[derive(Debug, Clone)]
pub struct TelemetryCodec {
    record_size: usize,
}

impl Default for TelemetryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCodec {
    pub fn new() -> Self {
        let record_size = LAYOUT.iter().map(|field| field.kind.width()).sum();
        Self { record_size }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Field names in wire order
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        LAYOUT.iter().map(|field| field.name)
    }

    /// Packs `source`, substituting each field's default where the value is
    /// missing or not numeric
    pub fn encode(&self, source: &Value) -> Vec<u8> {
        let mut record = Vec::with_capacity(self.record_size);
        for field in &LAYOUT {
            let value = field.source.read(source).unwrap_or(field.default);
            match field.kind {
                NumericKind::F32 => record.extend_from_slice(&(value as f32).to_le_bytes()),
                NumericKind::U8 => record.push(value.round().clamp(0.0, 255.0) as u8),
            }
        }
        record
    }

    /// Unpacks a record into the nested structure, with aggregated
    /// categories reported under `"average"`
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        if bytes.len() != self.record_size {
            return Err(CodecError::SizeMismatch {
                expected: self.record_size,
                actual: bytes.len(),
            });
        }

        let mut root = Map::new();
        let mut offset = 0;
        for field in &LAYOUT {
            let width = field.kind.width();
            let raw = &bytes[offset..offset + width];
            let value = match field.kind {
                NumericKind::F32 => {
                    let mut word = [0u8; 4];
                    word.copy_from_slice(raw);
                    Value::from(f32::from_le_bytes(word) as f64)
                }
                NumericKind::U8 => Value::from(raw[0]),
            };
            field.target.write(&mut root, value);
            offset += width;
        }
        Ok(Value::Object(root))
    }
}
