//! Driver for Medisana BS4xx body-composition scales.
//!
//! The scale keeps the last 30 weighings per user and replays them over BLE
//! once its clock is set. This crate decodes those frames, reduces a replay
//! to the latest reading per metric and publishes it keyed by user slot.

pub mod ble;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod machine;
pub mod protocol;
pub mod publish;
pub mod session;
pub mod timestamp;
pub mod transport;

pub use codec::{BodyRecord, PersonRecord, Record, WeightRecord};
pub use error::{Error, Result};
pub use machine::{Acquisition, Options, State};
pub use session::Session;
