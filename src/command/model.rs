//! Command model and command-packet encoding
//!
//! A [`Command`] is the vehicle's desired motion/actuator state. It is
//! serialized into one 64-bit payload word with one byte per field:
//!
//! ```text
//! bit  0..8   surge        (bias encoded)
//! bit  8..16  sway         (bias encoded)
//! bit 16..24  heave        (bias encoded)
//! bit 24..32  roll         (bias encoded)
//! bit 32..40  pitch        (bias encoded)
//! bit 40..48  yaw          (bias encoded)
//! bit 48..56  light        (raw 0..255)
//! bit 56..64  manipulator  (bias encoded)
//! ```
//!
//! The packet on the wire is `seq: u32 | payload: u64 | crc32: u32`, all
//! big-endian, with the CRC computed over the first twelve bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum;

/// Payload width in bytes
pub const PAYLOAD_LEN: usize = 8;

/// Full packet width: sequence + payload + checksum
pub const PACKET_LEN: usize = 4 + PAYLOAD_LEN + checksum::CRC_LEN;

/// Offset added to signed fields so they fit an unsigned byte
pub const BIAS: i16 = 128;

/// Scale applied to normalized signed inputs in `[-1.0, 1.0]`
pub const SIGNED_SCALE: f32 = 127.0;

/// Scale applied to the normalized light input in `[0.0, 1.0]`
pub const LIGHT_SCALE: f32 = 255.0;

/// One actuator field of the command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Surge,
    Sway,
    Heave,
    Roll,
    Pitch,
    Yaw,
    Light,
    Manipulator,
}

impl Field {
    /// All fields in payload order (least significant byte first)
    pub const ALL: [Field; 8] = [
        Field::Surge,
        Field::Sway,
        Field::Heave,
        Field::Roll,
        Field::Pitch,
        Field::Yaw,
        Field::Light,
        Field::Manipulator,
    ];

    /// Bit offset of the field inside the payload word
    pub fn shift(self) -> u32 {
        match self {
            Field::Surge => 0,
            Field::Sway => 8,
            Field::Heave => 16,
            Field::Roll => 24,
            Field::Pitch => 32,
            Field::Yaw => 40,
            Field::Light => 48,
            Field::Manipulator => 56,
        }
    }

    /// Light is the only unsigned field
    pub fn is_signed(self) -> bool {
        !matches!(self, Field::Light)
    }

    /// Legal integer range `(min, max)` of the field
    pub fn range(self) -> (i32, i32) {
        if self.is_signed() {
            (i8::MIN as i32, i8::MAX as i32)
        } else {
            (u8::MIN as i32, u8::MAX as i32)
        }
    }

    /// Converts a normalized input into the field's integer units.
    ///
    /// Signed fields accept `[-1.0, 1.0]`, light accepts `[0.0, 1.0]`.
    /// Out-of-range and non-finite inputs are clamped (NaN maps to 0).
    pub fn scale_normalized(self, value: f32) -> i32 {
        let value = if value.is_nan() { 0.0 } else { value };
        if self.is_signed() {
            (value.clamp(-1.0, 1.0) * SIGNED_SCALE).round() as i32
        } else {
            (value.clamp(0.0, 1.0) * LIGHT_SCALE).round() as i32
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Surge => "surge",
            Field::Sway => "sway",
            Field::Heave => "heave",
            Field::Roll => "roll",
            Field::Pitch => "pitch",
            Field::Yaw => "yaw",
            Field::Light => "light",
            Field::Manipulator => "manipulator",
        };
        write!(f, "{}", name)
    }
}

/// Desired vehicle state at an instant. Neutral is all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub surge: i8,
    pub sway: i8,
    pub heave: i8,
    pub roll: i8,
    pub pitch: i8,
    pub yaw: i8,
    pub light: u8,
    pub manipulator: i8,
}

impl Command {
    /// Stores `value` into `field`, saturating to the field's legal range
    pub fn set(&mut self, field: Field, value: i32) {
        let (min, max) = field.range();
        let value = value.clamp(min, max);
        match field {
            Field::Surge => self.surge = value as i8,
            Field::Sway => self.sway = value as i8,
            Field::Heave => self.heave = value as i8,
            Field::Roll => self.roll = value as i8,
            Field::Pitch => self.pitch = value as i8,
            Field::Yaw => self.yaw = value as i8,
            Field::Light => self.light = value as u8,
            Field::Manipulator => self.manipulator = value as i8,
        }
    }

    pub fn get(&self, field: Field) -> i32 {
        match field {
            Field::Surge => self.surge as i32,
            Field::Sway => self.sway as i32,
            Field::Heave => self.heave as i32,
            Field::Roll => self.roll as i32,
            Field::Pitch => self.pitch as i32,
            Field::Yaw => self.yaw as i32,
            Field::Light => self.light as i32,
            Field::Manipulator => self.manipulator as i32,
        }
    }

    /// Sets each named field from its normalized value
    pub fn set_from_normalized(&mut self, axes: &[(Field, f32)]) {
        for &(field, value) in axes {
            self.set(field, field.scale_normalized(value));
        }
    }

    /// Zeroes every motion axis and the manipulator, keeping the light level
    pub fn neutral_keeping_light(&self) -> Self {
        Self {
            light: self.light,
            ..Self::default()
        }
    }

    /// Returns the one-byte wire representation of a field
    pub fn wire_byte(&self, field: Field) -> u8 {
        let value = self.get(field);
        if field.is_signed() {
            (value as i16 + BIAS) as u8
        } else {
            value as u8
        }
    }

    /// Packs every field into the 64-bit payload word
    pub fn encode_word(&self) -> u64 {
        Field::ALL.iter().fold(0u64, |word, &field| {
            word | (self.wire_byte(field) as u64) << field.shift()
        })
    }

    /// Payload bytes as transmitted (big-endian word)
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        self.encode_word().to_be_bytes()
    }
}

/// Concatenates sequence, payload and the CRC-32 of both
pub fn build_packet(sequence: u32, payload: &[u8; PAYLOAD_LEN]) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0..4].copy_from_slice(&sequence.to_be_bytes());
    packet[4..4 + PAYLOAD_LEN].copy_from_slice(payload);
    let crc = checksum::crc32(&packet[..4 + PAYLOAD_LEN]);
    packet[4 + PAYLOAD_LEN..].copy_from_slice(&crc.to_be_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    // Firmware-side decode convention, used to check the sender is compatible
    fn firmware_decode(packet: &[u8; PACKET_LEN]) -> (u32, Command, bool) {
        let seq = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        let mut word_bytes = [0u8; 8];
        word_bytes.copy_from_slice(&packet[4..12]);
        let word = u64::from_be_bytes(word_bytes);
        let crc = u32::from_be_bytes([packet[12], packet[13], packet[14], packet[15]]);
        let byte = |field: Field| ((word >> field.shift()) & 0xFF) as i32;
        let mut cmd = Command::default();
        for field in Field::ALL {
            let raw = byte(field);
            cmd.set(field, if field.is_signed() { raw - 128 } else { raw });
        }
        (seq, cmd, crc == checksum::crc32(&packet[..12]))
    }

    #[test]
    fn test_set_saturates() {
        let mut cmd = Command::default();
        cmd.set(Field::Surge, 500);
        cmd.set(Field::Sway, -500);
        cmd.set(Field::Light, -3);
        cmd.set(Field::Manipulator, 128);
        assert_eq!(cmd.surge, 127);
        assert_eq!(cmd.sway, -128);
        assert_eq!(cmd.light, 0);
        assert_eq!(cmd.manipulator, 127);

        cmd.set(Field::Light, 999);
        assert_eq!(cmd.light, 255);
    }

    #[test]
    fn test_normalized_scaling() {
        let mut cmd = Command::default();
        cmd.set_from_normalized(&[
            (Field::Surge, -1.0),
            (Field::Heave, 0.5),
            (Field::Yaw, 3.0),
            (Field::Light, 0.5),
            (Field::Pitch, f32::NAN),
        ]);
        assert_eq!(cmd.surge, -127);
        assert_eq!(cmd.heave, 64);
        assert_eq!(cmd.yaw, 127);
        assert_eq!(cmd.light, 128);
        assert_eq!(cmd.pitch, 0);
        // untouched fields stay neutral
        assert_eq!(cmd.sway, 0);
    }

    #[test]
    fn test_bias_encoding() {
        let mut cmd = Command::default();
        assert_eq!(cmd.wire_byte(Field::Surge), 128);
        cmd.set(Field::Surge, -128);
        assert_eq!(cmd.wire_byte(Field::Surge), 0);
        cmd.set(Field::Surge, 127);
        assert_eq!(cmd.wire_byte(Field::Surge), 255);
        cmd.set(Field::Light, 200);
        assert_eq!(cmd.wire_byte(Field::Light), 200);
    }

    #[test]
    fn test_neutral_payload() {
        assert_eq!(Command::default().encode_word(), 0x0080_8080_8080_8080);
    }

    #[test]
    fn test_known_packet_vectors() {
        let packet = build_packet(1, &Command::default().encode());
        assert_eq!(
            packet,
            [
                0x00, 0x00, 0x00, 0x01, 0x80, 0x00, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x4a,
                0x94, 0x45, 0x6c
            ]
        );

        let cmd = Command {
            surge: -127,
            heave: 64,
            ..Command::default()
        };
        assert_eq!(
            build_packet(7, &cmd.encode()),
            [
                0x00, 0x00, 0x00, 0x07, 0x80, 0x00, 0x80, 0x80, 0x80, 0xc0, 0x80, 0x01, 0xd3,
                0xab, 0x02, 0x90
            ]
        );

        let cmd = Command {
            surge: 10,
            sway: -20,
            heave: 30,
            roll: -40,
            pitch: 50,
            yaw: -60,
            light: 200,
            manipulator: 127,
        };
        assert_eq!(
            build_packet(0x0102_0304, &cmd.encode()),
            [
                0x01, 0x02, 0x03, 0x04, 0xff, 0xc8, 0x44, 0xb2, 0x58, 0x9e, 0x6c, 0x8a, 0x14,
                0xa1, 0xe1, 0xe8
            ]
        );
    }

    #[test]
    fn test_firmware_decode_recovers_fields() {
        let samples = [
            Command::default(),
            Command {
                surge: -128,
                sway: 127,
                heave: -1,
                roll: 1,
                pitch: -64,
                yaw: 63,
                light: 255,
                manipulator: -128,
            },
            Command {
                light: 1,
                manipulator: 5,
                ..Command::default()
            },
        ];
        for (seq, cmd) in samples.iter().enumerate() {
            let packet = build_packet(seq as u32, &cmd.encode());
            let (decoded_seq, decoded, crc_ok) = firmware_decode(&packet);
            assert_eq!(decoded_seq, seq as u32);
            assert_eq!(&decoded, cmd);
            assert!(crc_ok);
        }
    }

    #[test]
    fn test_neutral_keeps_light() {
        let cmd = Command {
            surge: 40,
            yaw: -3,
            light: 77,
            manipulator: 9,
            ..Command::default()
        };
        let neutral = cmd.neutral_keeping_light();
        assert_eq!(neutral.light, 77);
        assert_eq!(neutral.surge, 0);
        assert_eq!(neutral.yaw, 0);
        assert_eq!(neutral.manipulator, 0);
    }
}
