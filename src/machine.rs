//! Connect / subscribe / dump / publish cycle.
//!
//! ```text
//! Idle -> Scanning -> Connecting -> Subscribing -> AwaitingDump
//!   ^        |            |                            |
//!   |        v            v (missing service)          v (disconnect, publish)
//!   +---- Cooldown <------+----------------------------+
//! ```
//!
//! The scale has no end-of-dump marker. It drops the link once it has sent
//! its history, so the disconnect is what finalizes and publishes a session.
//! Every failure path ends in [`State::Cooldown`]; the next scan is the
//! retry.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::{encode_sync_command, Record};
use crate::config::Settings;
use crate::protocol::{Channel, COMMAND_CHAR_UUID, SERVICE_UUID};
use crate::publish::{publish_session, Publish};
use crate::session::Session;
use crate::timestamp;
use crate::transport::{DiscoveredCharacteristic, Event, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    /// `deadline` is armed by the first tick after the scan started.
    Scanning { deadline: Option<Instant> },
    Connecting,
    Subscribing { pending: Vec<Channel> },
    AwaitingDump,
    /// `deadline` is armed by the first tick after the cooldown started.
    Cooldown { deadline: Option<Instant> },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Scanning { .. } => "scanning",
            State::Connecting => "connecting",
            State::Subscribing { .. } => "subscribing",
            State::AwaitingDump => "awaiting dump",
            State::Cooldown { .. } => "cooldown",
        }
    }

    fn is_linked(&self) -> bool {
        matches!(
            self,
            State::Connecting | State::Subscribing { .. } | State::AwaitingDump
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub use_time_offset: bool,
    pub cooldown: Duration,
    pub scan_window: Duration,
}

impl From<&Settings> for Options {
    fn from(settings: &Settings) -> Self {
        Self {
            use_time_offset: settings.use_time_offset,
            cooldown: settings.cooldown(),
            scan_window: settings.scan_window(),
        }
    }
}

/// Driver for one scale. Feed it every [`Event`] in arrival order.
pub struct Acquisition<T: Transport, C, P> {
    transport: T,
    clock: C,
    sink: P,
    options: Options,
    state: State,
    session: Session,
    scan_enabled: bool,
    has_command: bool,
}

impl<T, C, P> Acquisition<T, C, P>
where
    T: Transport,
    C: Clock,
    P: Publish,
{
    pub fn new(transport: T, clock: C, sink: P, options: Options) -> Self {
        Self {
            transport,
            clock,
            sink,
            options,
            state: State::Idle,
            session: Session::new(),
            scan_enabled: false,
            has_command: false,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    /// Leave `Idle` if scanning is enabled.
    pub fn start(&mut self, scan_enabled: bool) {
        self.handle(Event::ScanToggled(scan_enabled));
    }

    pub fn handle(&mut self, event: Event<T::Device>) {
        match event {
            Event::Tick(now) => self.on_tick(now),
            Event::ScanToggled(enabled) => self.on_scan_toggled(enabled),
            Event::Advertisement { device, services } => self.on_advertisement(device, &services),
            Event::Connected(result) => self.on_connected(result),
            Event::Discovered(result) => self.on_discovered(result),
            Event::Subscribed {
                characteristic,
                result,
            } => self.on_subscribed(characteristic, result),
            Event::Written {
                characteristic,
                result,
            } => match result {
                Ok(()) => debug!("wrote {characteristic}"),
                Err(e) => warn!("can not write to characteristic {characteristic}: {e}"),
            },
            Event::Notification {
                characteristic,
                value,
            } => self.on_notification(characteristic, &value),
            Event::Disconnected => self.on_disconnected(),
        }
    }

    fn transition(&mut self, next: State) {
        if self.state.name() != next.name() {
            info!("{} -> {}", self.state.name(), next.name());
        }
        self.state = next;
    }

    fn on_tick(&mut self, now: Instant) {
        match self.state {
            State::Scanning { deadline: None } => {
                self.state = State::Scanning {
                    deadline: Some(now + self.options.scan_window),
                };
            }
            State::Scanning {
                deadline: Some(deadline),
            } if now >= deadline => {
                debug!("no scale advertised during the scan window");
                self.transport.stop_scan();
                self.enter_cooldown();
            }
            State::Cooldown { deadline: None } => {
                self.state = State::Cooldown {
                    deadline: Some(now + self.options.cooldown),
                };
            }
            State::Cooldown {
                deadline: Some(deadline),
            } if now >= deadline => {
                if self.scan_enabled {
                    self.begin_scan();
                } else {
                    self.transition(State::Idle);
                }
            }
            _ => {}
        }
    }

    fn on_scan_toggled(&mut self, enabled: bool) {
        info!("scanning {}", if enabled { "enabled" } else { "disabled" });
        self.scan_enabled = enabled;
        match (&self.state, enabled) {
            (State::Idle, true) => self.begin_scan(),
            (State::Scanning { .. }, false) => {
                self.transport.stop_scan();
                self.transition(State::Idle);
            }
            // a running cycle completes; the cooldown honours the switch
            _ => {}
        }
    }

    fn on_advertisement(&mut self, device: T::Device, services: &[Uuid]) {
        if !matches!(self.state, State::Scanning { .. }) {
            return;
        }
        if !services.contains(&SERVICE_UUID) {
            debug!("ignoring advertisement from {device:?}");
            return;
        }
        info!("found scale {device:?}");
        self.transport.stop_scan();
        self.transport.connect(&device);
        self.transition(State::Connecting);
    }

    fn on_connected(&mut self, result: Result<(), TransportError>) {
        if self.state != State::Connecting {
            return;
        }
        match result {
            Ok(()) => {
                info!("connected, discovering services");
                self.transport.discover();
            }
            Err(e) => {
                error!("we have failed to connect to the scale: {e}");
                self.abort();
            }
        }
    }

    fn on_discovered(&mut self, result: Result<Vec<DiscoveredCharacteristic>, TransportError>) {
        if self.state != State::Connecting {
            return;
        }
        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(e) => {
                error!("{e}");
                self.abort();
                return;
            }
        };

        let present = |uuid: Uuid| {
            characteristics
                .iter()
                .any(|c| c.service == SERVICE_UUID && c.uuid == uuid)
        };
        if !characteristics.iter().any(|c| c.service == SERVICE_UUID) {
            error!("failed to find our service UUID: {SERVICE_UUID}");
            self.abort();
            return;
        }
        if let Some(missing) = Channel::DATA.into_iter().find(|c| !present(c.uuid())) {
            error!("failed to find the {missing} characteristic {}", missing.uuid());
            self.abort();
            return;
        }
        self.has_command = present(COMMAND_CHAR_UUID);

        self.session = Session::new();
        for channel in Channel::DATA {
            self.transport.subscribe(channel.uuid());
        }
        self.transition(State::Subscribing {
            pending: Channel::DATA.to_vec(),
        });
    }

    fn on_subscribed(&mut self, characteristic: Uuid, result: Result<(), TransportError>) {
        let State::Subscribing { pending } = &mut self.state else {
            return;
        };
        let Some(channel) = Channel::from_uuid(&characteristic) else {
            return;
        };
        match result {
            Ok(()) => debug!("indications enabled on {channel}"),
            Err(e) => warn!("{channel}: {e}"),
        }
        pending.retain(|c| *c != channel);
        if pending.is_empty() {
            self.request_dump();
        }
    }

    /// Resync the scale's clock, which also makes it replay its history.
    fn request_dump(&mut self) {
        if self.has_command {
            let device_time = timestamp::device_clock(self.clock.now(), self.options.use_time_offset);
            let command = encode_sync_command(device_time);
            debug!("sending sync command {command:02x?}");
            self.transport.write(COMMAND_CHAR_UUID, command.to_vec());
        } else {
            warn!("command characteristic missing, waiting for unsolicited data");
        }
        self.transition(State::AwaitingDump);
    }

    fn on_notification(&mut self, characteristic: Uuid, value: &[u8]) {
        if !matches!(self.state, State::Subscribing { .. } | State::AwaitingDump) {
            debug!("notification outside a session from {characteristic}");
            return;
        }
        let Some(channel) = Channel::from_uuid(&characteristic) else {
            debug!("notification from unknown characteristic {characteristic}");
            return;
        };
        debug!("{channel}: {value:02x?}");
        match Record::decode(channel, value, self.options.use_time_offset) {
            Ok(record) => {
                if !record.is_valid() {
                    debug!("{channel} frame with bad marker");
                }
                self.session.ingest(record, self.clock.now());
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn on_disconnected(&mut self) {
        if !self.state.is_linked() {
            debug!("disconnect while {}", self.state.name());
            return;
        }
        info!("scale disconnected");
        let session = self.session.finalize();
        publish_session(&session, &mut self.sink);
        self.enter_cooldown();
    }

    /// Give up on the current connection.
    fn abort(&mut self) {
        self.transport.disconnect();
        self.enter_cooldown();
    }

    fn begin_scan(&mut self) {
        self.transport.start_scan(SERVICE_UUID);
        self.transition(State::Scanning { deadline: None });
    }

    fn enter_cooldown(&mut self) {
        self.session = Session::new();
        self.has_command = false;
        info!("starting scan in {} seconds", self.options.cooldown.as_secs());
        self.transition(State::Cooldown { deadline: None });
    }
}
