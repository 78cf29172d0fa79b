//! [`Transport`] on top of btleplug.
//!
//! btleplug is async while the driver wants fire-and-forget commands, so
//! every command runs as its own tokio task and reports back through the
//! driver's event queue. Adapter-level events (advertisements, disconnects)
//! are forwarded by the task started in [`BtleTransport::listen`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use log::{debug, error, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::Result;
use crate::transport::{DiscoveredCharacteristic, Event, Transport, TransportError};

pub type BleEvent = Event<Peripheral>;

pub struct BtleTransport {
    adapter: Adapter,
    events: UnboundedSender<BleEvent>,
    peripheral: Option<Peripheral>,
    linked: Arc<Mutex<Option<PeripheralId>>>,
}

impl BtleTransport {
    pub fn new(adapter: Adapter, events: UnboundedSender<BleEvent>) -> Self {
        Self {
            adapter,
            events,
            peripheral: None,
            linked: Arc::new(Mutex::new(None)),
        }
    }

    /// Start forwarding adapter events. Call before the first scan.
    pub async fn listen(&self) -> Result<JoinHandle<()>> {
        // Each adapter has an event stream; it has to exist before scanning
        // starts or early advertisements are lost.
        let mut stream = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let linked = self.linked.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let forwarded = match event {
                    CentralEvent::ServicesAdvertisement { id, services } => {
                        match adapter.peripheral(&id).await {
                            Ok(device) => Some(Event::Advertisement { device, services }),
                            Err(e) => {
                                debug!("advertisement from vanished device: {e}");
                                None
                            }
                        }
                    }
                    CentralEvent::DeviceDiscovered(id) => advertised(&adapter, &id).await,
                    CentralEvent::DeviceDisconnected(id) if release(&linked, &id) => {
                        Some(Event::Disconnected)
                    }
                    _ => None,
                };
                if let Some(event) = forwarded {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            debug!("adapter event stream closed");
        }))
    }

    fn peripheral(&self) -> Option<Peripheral> {
        self.peripheral.clone()
    }

    /// Run `task` and post the event it yields.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = BleEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            if events.send(task.await).is_err() {
                debug!("event queue closed");
            }
        });
    }

    fn post(&self, event: BleEvent) {
        if self.events.send(event).is_err() {
            debug!("event queue closed");
        }
    }
}

/// Forget the link to `id`; false if some other device went away.
fn release(linked: &Mutex<Option<PeripheralId>>, id: &PeripheralId) -> bool {
    let mut linked = linked.lock().unwrap_or_else(PoisonError::into_inner);
    if linked.as_ref() == Some(id) {
        *linked = None;
        true
    } else {
        false
    }
}

/// Build an advertisement event from the properties of a newly seen device.
async fn advertised(adapter: &Adapter, id: &PeripheralId) -> Option<BleEvent> {
    let device = adapter.peripheral(id).await.ok()?;
    let properties = device.properties().await.ok()??;
    Some(Event::Advertisement {
        device,
        services: properties.services,
    })
}

fn find(peripheral: &Peripheral, uuid: Uuid) -> std::result::Result<Characteristic, TransportError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(TransportError::CharacteristicNotFound(uuid))
}

impl Transport for BtleTransport {
    type Device = Peripheral;

    fn start_scan(&mut self, service: Uuid) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let filter = ScanFilter {
                services: vec![service],
            };
            if let Err(e) = adapter.start_scan(filter).await {
                error!("{}", TransportError::Scan(e.to_string()));
            }
        });
    }

    fn stop_scan(&mut self) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("failed to stop scan: {e}");
            }
        });
    }

    fn connect(&mut self, device: &Peripheral) {
        self.peripheral = Some(device.clone());
        *self.linked.lock().unwrap_or_else(PoisonError::into_inner) = Some(device.id());

        let peripheral = device.clone();
        let events = self.events.clone();
        self.spawn(async move {
            if let Err(e) = peripheral.connect().await {
                return Event::Connected(Err(TransportError::Connect(e.to_string())));
            }
            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => return Event::Connected(Err(TransportError::Connect(e.to_string()))),
            };
            tokio::spawn(async move {
                while let Some(notification) = notifications.next().await {
                    let event = Event::Notification {
                        characteristic: notification.uuid,
                        value: notification.value,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
            });
            Event::Connected(Ok(()))
        });
    }

    fn discover(&mut self) {
        let Some(peripheral) = self.peripheral() else {
            self.post(Event::Discovered(Err(TransportError::NotConnected)));
            return;
        };
        self.spawn(async move {
            if let Err(e) = peripheral.discover_services().await {
                return Event::Discovered(Err(TransportError::Discovery(e.to_string())));
            }
            let found = peripheral
                .services()
                .iter()
                .flat_map(|service| {
                    service.characteristics.iter().map(|c| DiscoveredCharacteristic {
                        service: service.uuid,
                        uuid: c.uuid,
                    })
                })
                .collect();
            Event::Discovered(Ok(found))
        });
    }

    fn subscribe(&mut self, characteristic: Uuid) {
        let Some(peripheral) = self.peripheral() else {
            self.post(Event::Subscribed {
                characteristic,
                result: Err(TransportError::NotConnected),
            });
            return;
        };
        self.spawn(async move {
            let result = match find(&peripheral, characteristic) {
                Ok(c) => peripheral
                    .subscribe(&c)
                    .await
                    .map_err(|e| TransportError::Subscribe(e.to_string())),
                Err(e) => Err(e),
            };
            Event::Subscribed {
                characteristic,
                result,
            }
        });
    }

    fn write(&mut self, characteristic: Uuid, value: Vec<u8>) {
        let Some(peripheral) = self.peripheral() else {
            self.post(Event::Written {
                characteristic,
                result: Err(TransportError::NotConnected),
            });
            return;
        };
        self.spawn(async move {
            let result = match find(&peripheral, characteristic) {
                Ok(c) => peripheral
                    .write(&c, &value, WriteType::WithResponse)
                    .await
                    .map_err(|e| TransportError::Write(e.to_string())),
                Err(e) => Err(e),
            };
            Event::Written {
                characteristic,
                result,
            }
        });
    }

    fn disconnect(&mut self) {
        *self.linked.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let Some(peripheral) = self.peripheral.take() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!("failed to disconnect: {e}");
            }
        });
    }
}
