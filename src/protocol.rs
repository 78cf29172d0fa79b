//! GATT layout of the Medisana BS4xx family.
//!
//! The scale pushes its data through indications on three characteristics
//! and accepts a single command on a fourth one:
//!
//! | Channel | Handle | UUID                                   |
//! |---------|--------|----------------------------------------|
//! | Person  | 0x26   | `00008a82-0000-1000-8000-00805f9b34fb` |
//! | Weight  | 0x1c   | `00008a21-0000-1000-8000-00805f9b34fb` |
//! | Body    | 0x1f   | `00008a22-0000-1000-8000-00805f9b34fb` |
//! | Command | 0x31   | `00008a81-0000-1000-8000-00805f9b34fb` |
//!
//! Once the sync command is written the scale dumps the last 30 weighings of
//! the active user and then drops the link on its own.

use std::fmt;
use uuid::Uuid;

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_78b2_0000_1000_8000_0080_5f9b_34fb);

pub const PERSON_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_8a82_0000_1000_8000_0080_5f9b_34fb);
pub const WEIGHT_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_8a21_0000_1000_8000_0080_5f9b_34fb);
pub const BODY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_8a22_0000_1000_8000_0080_5f9b_34fb);
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_8a81_0000_1000_8000_0080_5f9b_34fb);

pub const PERSON_FRAME_LEN: usize = 9;
pub const WEIGHT_FRAME_LEN: usize = 14;
pub const BODY_FRAME_LEN: usize = 16;
pub const COMMAND_FRAME_LEN: usize = 5;

pub const PERSON_MARKER: u8 = 0x84;
pub const WEIGHT_MARKER: u8 = 0x1d;
pub const BODY_MARKER: u8 = 0x6f;
pub const SYNC_COMMAND: u8 = 0x02;

/// Characteristics the driver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Person,
    Weight,
    Body,
    Command,
}

impl Channel {
    /// The three indication channels that must all be present.
    pub const DATA: [Channel; 3] = [Channel::Person, Channel::Weight, Channel::Body];

    pub fn uuid(self) -> Uuid {
        match self {
            Channel::Person => PERSON_CHAR_UUID,
            Channel::Weight => WEIGHT_CHAR_UUID,
            Channel::Body => BODY_CHAR_UUID,
            Channel::Command => COMMAND_CHAR_UUID,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        match *uuid {
            PERSON_CHAR_UUID => Some(Channel::Person),
            WEIGHT_CHAR_UUID => Some(Channel::Weight),
            BODY_CHAR_UUID => Some(Channel::Body),
            COMMAND_CHAR_UUID => Some(Channel::Command),
            _ => None,
        }
    }

    /// Expected frame length, in bytes.
    pub fn frame_len(self) -> usize {
        match self {
            Channel::Person => PERSON_FRAME_LEN,
            Channel::Weight => WEIGHT_FRAME_LEN,
            Channel::Body => BODY_FRAME_LEN,
            Channel::Command => COMMAND_FRAME_LEN,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Person => "person",
            Channel::Weight => "weight",
            Channel::Body => "body",
            Channel::Command => "command",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_uuid_lookup() {
        for channel in [Channel::Person, Channel::Weight, Channel::Body, Channel::Command] {
            assert_eq!(Channel::from_uuid(&channel.uuid()), Some(channel));
        }
        assert_eq!(Channel::from_uuid(&SERVICE_UUID), None);
    }

    #[test]
    fn test_uuid_text_form() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "000078b2-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            WEIGHT_CHAR_UUID.to_string(),
            "00008a21-0000-1000-8000-00805f9b34fb"
        );
    }
}
