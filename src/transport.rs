//! Boundary between the acquisition state machine and the BLE stack.
//!
//! Commands are fire-and-forget: a [`Transport`] starts the operation and
//! reports its outcome later as an [`Event`] on the driver's queue. The
//! driver is the only consumer of that queue, so every state change happens
//! in one serialized stream.

use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("scan failed: {0}")]
    Scan(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("service discovery failed: {0}")]
    Discovery(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("not connected")]
    NotConnected,
}

/// A characteristic found during discovery, with the service it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// Everything the driver reacts to.
#[derive(Debug, Clone)]
pub enum Event<D> {
    /// Periodic timer, roughly once a second.
    Tick(Instant),
    /// The scan switch was flipped.
    ScanToggled(bool),
    /// An advertisement was seen while scanning.
    Advertisement { device: D, services: Vec<Uuid> },
    Connected(Result<(), TransportError>),
    Discovered(Result<Vec<DiscoveredCharacteristic>, TransportError>),
    Subscribed {
        characteristic: Uuid,
        result: Result<(), TransportError>,
    },
    Written {
        characteristic: Uuid,
        result: Result<(), TransportError>,
    },
    Notification { characteristic: Uuid, value: Vec<u8> },
    Disconnected,
}

/// Commands the driver issues to the BLE stack.
pub trait Transport {
    type Device: Clone + std::fmt::Debug;

    /// Start scanning for advertisements of `service`.
    fn start_scan(&mut self, service: Uuid);
    fn stop_scan(&mut self);
    /// Answered by [`Event::Connected`].
    fn connect(&mut self, device: &Self::Device);
    /// Answered by [`Event::Discovered`].
    fn discover(&mut self);
    /// Enable indications; answered by [`Event::Subscribed`].
    fn subscribe(&mut self, characteristic: Uuid);
    /// Write with response; answered by [`Event::Written`].
    fn write(&mut self, characteristic: Uuid, value: Vec<u8>);
    /// Answered by [`Event::Disconnected`] if a link was up.
    fn disconnect(&mut self);
}
