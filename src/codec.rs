//! Decoders for the three indication frames and the sync command encoder.
//!
//! Every frame starts with a fixed marker byte. A frame whose marker does not
//! match decodes to the record's default value with `valid == false`; the
//! decoders themselves never fail once the frame has the right length.
//! Multi-byte fields are little-endian.

use std::fmt;

use thiserror::Error;

use crate::protocol::{
    Channel, BODY_FRAME_LEN, BODY_MARKER, COMMAND_FRAME_LEN, PERSON_FRAME_LEN, PERSON_MARKER,
    SYNC_COMMAND, WEIGHT_FRAME_LEN, WEIGHT_MARKER,
};
use crate::timestamp;

/// Slot value of a person record that has not been filled in.
pub const UNSET_SLOT: u8 = 255;

/// Body composition values use the low 12 bits; the top nibble is always 0xf.
const COMPOSITION_MASK: u16 = 0x0fff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{channel} frame too short: expected {expected} bytes, got {actual}")]
    Truncated {
        channel: Channel,
        expected: usize,
        actual: usize,
    },
    #[error("{0} is not a data channel")]
    NotDataChannel(Channel),
}

fn le16(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn le32(frame: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

fn composition(frame: &[u8], offset: usize) -> f64 {
    f64::from(le16(frame, offset) & COMPOSITION_MASK) / 10.0
}

/// User profile stored on the scale.
///
/// ```text
/// 0  marker 0x84
/// 2  slot              1..8
/// 4  gender            1 = male, 2 = female
/// 5  age               years
/// 6  height            cm
/// 8  activity          3 = high, otherwise normal
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonRecord {
    pub valid: bool,
    pub slot: u8,
    pub is_male: bool,
    pub age_years: u8,
    pub height_m: f64,
    pub high_activity: bool,
}

impl Default for PersonRecord {
    fn default() -> Self {
        Self {
            valid: false,
            slot: UNSET_SLOT,
            is_male: false,
            age_years: 0,
            height_m: 0.0,
            high_activity: false,
        }
    }
}

impl PersonRecord {
    pub fn decode(frame: &[u8; PERSON_FRAME_LEN]) -> Self {
        if frame[0] != PERSON_MARKER {
            return Self::default();
        }
        Self {
            valid: true,
            slot: frame[2],
            is_male: frame[4] == 1,
            age_years: frame[5],
            height_m: f64::from(frame[6]) / 100.0,
            high_activity: frame[8] == 3,
        }
    }
}

impl fmt::Display for PersonRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return f.write_str("invalid");
        }
        write!(
            f,
            "person: {}; gender: {}; age: {}; size: {:.2}; activity: {}",
            self.slot,
            if self.is_male { "male" } else { "female" },
            self.age_years,
            self.height_m,
            if self.high_activity { "high" } else { "normal" },
        )
    }
}

/// One weighing.
///
/// ```text
/// 0  marker 0x1d
/// 1  weight            u16, 1/100 kg
/// 5  timestamp         u32, sanitized
/// 13 slot              1..8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightRecord {
    pub valid: bool,
    pub timestamp: i64,
    pub slot: u8,
    pub weight_kg: f64,
}

impl WeightRecord {
    pub fn decode(frame: &[u8; WEIGHT_FRAME_LEN], use_offset: bool) -> Self {
        if frame[0] != WEIGHT_MARKER {
            return Self::default();
        }
        Self {
            valid: true,
            weight_kg: f64::from(le16(frame, 1)) / 100.0,
            timestamp: timestamp::sanitize(i64::from(le32(frame, 5)), use_offset),
            slot: frame[13],
        }
    }

    /// Ordering key used when reducing a dump.
    pub fn rank(&self) -> (bool, i64) {
        (self.valid, self.timestamp)
    }
}

impl fmt::Display for WeightRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return f.write_str("invalid");
        }
        write!(
            f,
            "person: {}; time: {}; weight: {:.2}",
            self.slot,
            timestamp::format(self.timestamp),
            self.weight_kg
        )
    }
}

/// Body composition measured together with a weighing.
///
/// ```text
/// 0  marker 0x6f
/// 1  timestamp         u32, sanitized
/// 5  slot              1..8
/// 6  kcal              u16
/// 8  fat               u16 & 0x0fff, 1/10 %
/// 10 water             u16 & 0x0fff, 1/10 %
/// 12 muscle            u16 & 0x0fff, 1/10 %
/// 14 bone              u16 & 0x0fff, 1/10 %
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyRecord {
    pub valid: bool,
    pub timestamp: i64,
    pub slot: u8,
    pub kcal: u16,
    pub fat_pct: f64,
    pub water_pct: f64,
    pub muscle_pct: f64,
    pub bone_pct: f64,
}

impl BodyRecord {
    pub fn decode(frame: &[u8; BODY_FRAME_LEN], use_offset: bool) -> Self {
        if frame[0] != BODY_MARKER {
            return Self::default();
        }
        Self {
            valid: true,
            timestamp: timestamp::sanitize(i64::from(le32(frame, 1)), use_offset),
            slot: frame[5],
            kcal: le16(frame, 6),
            fat_pct: composition(frame, 8),
            water_pct: composition(frame, 10),
            muscle_pct: composition(frame, 12),
            bone_pct: composition(frame, 14),
        }
    }

    /// Ordering key used when reducing a dump.
    pub fn rank(&self) -> (bool, i64) {
        (self.valid, self.timestamp)
    }
}

impl fmt::Display for BodyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return f.write_str("invalid");
        }
        write!(
            f,
            "person: {}; time: {}; kcal: {}; fat: {:.1}; tbw: {:.1}; muscle: {:.1}; bone: {:.1}",
            self.slot,
            timestamp::format(self.timestamp),
            self.kcal,
            self.fat_pct,
            self.water_pct,
            self.muscle_pct,
            self.bone_pct
        )
    }
}

/// A decoded indication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    Person(PersonRecord),
    Weight(WeightRecord),
    Body(BodyRecord),
}

impl Record {
    /// Decode the value of an indication received on `channel`.
    ///
    /// The scale pads its frames to the negotiated size, so anything at
    /// least as long as the frame layout is accepted and the tail ignored.
    pub fn decode(channel: Channel, value: &[u8], use_offset: bool) -> Result<Self, CodecError> {
        match channel {
            Channel::Person => Ok(Record::Person(PersonRecord::decode(frame(channel, value)?))),
            Channel::Weight => Ok(Record::Weight(WeightRecord::decode(
                frame(channel, value)?,
                use_offset,
            ))),
            Channel::Body => Ok(Record::Body(BodyRecord::decode(
                frame(channel, value)?,
                use_offset,
            ))),
            Channel::Command => Err(CodecError::NotDataChannel(channel)),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Record::Person(person) => person.valid,
            Record::Weight(weight) => weight.valid,
            Record::Body(body) => body.valid,
        }
    }
}

fn frame<'a, const N: usize>(channel: Channel, value: &'a [u8]) -> Result<&'a [u8; N], CodecError> {
    value
        .get(..N)
        .and_then(|head| head.try_into().ok())
        .ok_or(CodecError::Truncated {
            channel,
            expected: N,
            actual: value.len(),
        })
}

/// Build the command that sets the scale's clock and starts the history dump.
pub fn encode_sync_command(device_time: u32) -> [u8; COMMAND_FRAME_LEN] {
    let [b0, b1, b2, b3] = device_time.to_le_bytes();
    [SYNC_COMMAND, b0, b1, b2, b3]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::EPOCH_OFFSET;
    use const_decoder::Decoder;

    // Captured from a BS444 during a history dump.
    const CAPTURED_PERSON: [u8; 20] = Decoder::Hex.decode(b"845302800134b6e0000000000000000000000000");
    const CAPTURED_WEIGHT: [u8; 19] = Decoder::Hex.decode(b"1d8c1e00fe6e0aa056451100ff020900000000");
    const CAPTURED_BODY: [u8; 19] = Decoder::Hex.decode(b"6f6e0aa05602440ab8f07ff26bf11ef0000000");

    #[test]
    fn test_decode_person() {
        let frame = [0x84, 0x00, 0x02, 0x00, 0x01, 0x1e, 0xc8, 0x00, 0x03];
        let person = PersonRecord::decode(&frame);
        assert_eq!(
            person,
            PersonRecord {
                valid: true,
                slot: 2,
                is_male: true,
                age_years: 30,
                height_m: 2.0,
                high_activity: true,
            }
        );
    }

    #[test]
    fn test_decode_person_female_normal_activity() {
        let frame = [0x84, 0x00, 0x05, 0x00, 0x02, 0x41, 0xa5, 0x00, 0x00];
        let person = PersonRecord::decode(&frame);
        assert!(person.valid);
        assert_eq!(person.slot, 5);
        assert!(!person.is_male);
        assert_eq!(person.age_years, 65);
        assert!((person.height_m - 1.65).abs() < 1e-9);
        assert!(!person.high_activity);
    }

    #[test]
    fn test_decode_weight() {
        let frame = [
            0x1d, 0x88, 0x13, 0x00, 0x00, 0x40, 0x42, 0x0f, 0x29, 0x00, 0x00, 0x00, 0x00, 0x03,
        ];
        let weight = WeightRecord::decode(&frame, true);
        assert!(weight.valid);
        assert_eq!(weight.slot, 3);
        assert!((weight.weight_kg - 50.0).abs() < 1e-9);
        assert_eq!(weight.timestamp, 0x290f_4240 + EPOCH_OFFSET);

        let absolute = WeightRecord::decode(&frame, false);
        assert_eq!(absolute.timestamp, 0x290f_4240);
    }

    #[test]
    fn test_decode_captured_frames() {
        let person = match Record::decode(Channel::Person, &CAPTURED_PERSON, true) {
            Ok(Record::Person(person)) => person,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(person.slot, 2);
        assert!(person.is_male);
        assert_eq!(person.age_years, 52);
        assert!((person.height_m - 1.82).abs() < 1e-9);
        assert!(!person.high_activity);

        // This firmware already reports Unix time; the offset would overflow
        // and is therefore skipped.
        let weight = match Record::decode(Channel::Weight, &CAPTURED_WEIGHT, true) {
            Ok(Record::Weight(weight)) => weight,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(weight.slot, 2);
        assert!((weight.weight_kg - 78.2).abs() < 1e-9);
        assert_eq!(weight.timestamp, 0x56a0_0a6e);

        let body = match Record::decode(Channel::Body, &CAPTURED_BODY, true) {
            Ok(Record::Body(body)) => body,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(body.timestamp, weight.timestamp);
        assert_eq!(body.slot, 2);
        assert_eq!(body.kcal, 2628);
        assert!((body.fat_pct - 18.4).abs() < 1e-9);
        assert!((body.water_pct - 63.9).abs() < 1e-9);
        assert!((body.muscle_pct - 36.3).abs() < 1e-9);
        assert!((body.bone_pct - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_marker_yields_default() {
        let mut frame = CAPTURED_BODY;
        frame[0] = 0x6e;
        let record = Record::decode(Channel::Body, &frame, true).unwrap();
        assert_eq!(record, Record::Body(BodyRecord::default()));
        assert!(!record.is_valid());

        let person = PersonRecord::decode(&[0u8; PERSON_FRAME_LEN]);
        assert!(!person.valid);
        assert_eq!(person.slot, UNSET_SLOT);
    }

    #[test]
    fn test_truncated_frame() {
        let err = Record::decode(Channel::Weight, &CAPTURED_WEIGHT[..10], true).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                channel: Channel::Weight,
                expected: WEIGHT_FRAME_LEN,
                actual: 10,
            }
        );
    }

    #[test]
    fn test_command_channel_is_not_decoded() {
        assert_eq!(
            Record::decode(Channel::Command, &[0x02, 0, 0, 0, 0], true),
            Err(CodecError::NotDataChannel(Channel::Command))
        );
    }

    #[test]
    fn test_encode_sync_command() {
        assert_eq!(
            encode_sync_command(0x290f_4240),
            [0x02, 0x40, 0x42, 0x0f, 0x29]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(WeightRecord::default().to_string(), "invalid");
        let person = PersonRecord::decode(&[0x84, 0x00, 0x02, 0x00, 0x01, 0x1e, 0xc8, 0x00, 0x03]);
        assert_eq!(
            person.to_string(),
            "person: 2; gender: male; age: 30; size: 2.00; activity: high"
        );
    }
}
