mod bluez_utils;
mod characteristic_utils;

use crate::{
    config::AdvertisingParameters,
    counter::dispatcher::Notifier,
    error::{Error, ErrorType},
    gatt::{peripheral_event::PeripheralEvent, service},
};
use async_trait::async_trait;
use bluer::{
    adv::{Advertisement, AdvertisementHandle, Feature, Type},
    gatt::local::{Application, ApplicationHandle},
    Adapter, AdapterEvent, AdapterProperty, Address, DeviceEvent, DeviceProperty,
};
use bluez_utils::Writers;
use characteristic_utils::{parse_service, spawn_notify_sessions};
use futures::{channel::oneshot, StreamExt};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use super::PeripheralImpl;

/// Longest a single notification may wait on a central's notify session.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Peripheral {
    pub adapter: Adapter,
    adv_handle: Mutex<Option<AdvertisementHandle>>,
    app_handles: Mutex<Vec<ApplicationHandle>>,
    sender_tx: Sender<PeripheralEvent>,
    writers: Writers,
    _drop_tx: oneshot::Sender<()>,
}

impl Peripheral {
    pub async fn new(sender_tx: Sender<PeripheralEvent>) -> Result<Self, Error> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        log::debug!(
            "Initialize Bluetooth adapter {} with address {}",
            adapter.name(),
            adapter.address().await?
        );

        let watched: Arc<Mutex<HashSet<Address>>> = Arc::new(Mutex::new(HashSet::new()));
        for address in adapter.device_addresses().await? {
            watch_device(&adapter, address, sender_tx.clone(), watched.clone());
        }

        let (drop_tx, drop_rx) = oneshot::channel();
        let mut adapter_stream = adapter.events().await?;
        let sender = sender_tx.clone();
        let events_adapter = adapter.clone();
        tokio::spawn(async move {
            let stream_future = async {
                while let Some(event) = adapter_stream.next().await {
                    match event {
                        AdapterEvent::PropertyChanged(AdapterProperty::ActiveAdvertisingInstances(
                            i,
                        )) => {
                            log::debug!("ActiveAdvertisingInstances: {i}")
                        }
                        AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) => {
                            if let Err(err) = sender
                                .send(PeripheralEvent::StateUpdate {
                                    is_powered: powered,
                                })
                                .await
                                .map_err(Error::from)
                            {
                                log::error!("Error sending state update event: {err}");
                            }
                        }
                        AdapterEvent::DeviceAdded(address) => {
                            watch_device(&events_adapter, address, sender.clone(), watched.clone());
                        }
                        AdapterEvent::DeviceRemoved(address) => {
                            send_connection(&sender, address, false).await;
                        }
                        _ => {}
                    }
                }
            };
            tokio::select! {
                _ = stream_future => {},
                _ = drop_rx => {}
            }
        });

        Ok(Peripheral {
            adapter,
            adv_handle: Mutex::new(None),
            app_handles: Mutex::new(Vec::new()),
            sender_tx,
            writers: Arc::new(Mutex::new(HashMap::new())),
            _drop_tx: drop_tx,
        })
    }
}

#[async_trait]
impl PeripheralImpl for Peripheral {
    async fn is_powered(&self) -> Result<bool, Error> {
        let result = self.adapter.is_powered().await?;
        Ok(result)
    }

    async fn is_advertising(&self) -> Result<bool, Error> {
        let instances = self.adapter.active_advertising_instances().await?;
        let has_handle = match self.adv_handle.lock() {
            Ok(handle) => handle.is_some(),
            Err(err) => return Err(Error::from_string(err.to_string(), ErrorType::Bluez)),
        };
        Ok(instances > 0 && has_handle)
    }

    async fn start_advertising(&self, parameters: &AdvertisingParameters) -> Result<(), Error> {
        let services: BTreeSet<Uuid> = parameters.service_uuids.iter().copied().collect();
        let mut system_includes = BTreeSet::new();
        if parameters.include_tx_power {
            system_includes.insert(Feature::TxPower);
        }
        let advertisement_type = if parameters.connectable {
            Type::Peripheral
        } else {
            Type::Broadcast
        };
        let interval = parameters.mode.interval();

        let le_advertisement = Advertisement {
            advertisement_type,
            service_uuids: services,
            discoverable: Some(true),
            local_name: Some(parameters.local_name.clone()),
            system_includes,
            min_interval: Some(interval),
            max_interval: Some(interval),
            timeout: parameters.timeout,
            ..Default::default()
        };
        let adv_handle = self
            .adapter
            .advertise(le_advertisement)
            .await
            .map_err(|err| Error::from_string(err.to_string(), ErrorType::Advertising))?;

        match self.adv_handle.lock() {
            Ok(mut handle) => *handle = Some(adv_handle),
            Err(err) => return Err(Error::from_string(err.to_string(), ErrorType::Bluez)),
        }
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), Error> {
        // Dropping the handle unregisters the advertisement.
        let handle = match self.adv_handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(err) => return Err(Error::from_string(err.to_string(), ErrorType::Bluez)),
        };
        drop(handle);
        Ok(())
    }

    async fn add_service(&self, service: &service::Service) -> Result<(), Error> {
        let (handlers, bluer_service) = parse_service(service, self.sender_tx.clone());

        let app_handle = self
            .adapter
            .serve_gatt_application(Application {
                services: vec![bluer_service],
                ..Default::default()
            })
            .await?;

        for handler in handlers {
            spawn_notify_sessions(handler, self.sender_tx.clone(), self.writers.clone());
        }

        match self.app_handles.lock() {
            Ok(mut handles) => handles.push(app_handle),
            Err(err) => return Err(Error::from_string(err.to_string(), ErrorType::Bluez)),
        }
        log::debug!("Serving GATT service {}", service.uuid);
        Ok(())
    }
}

#[async_trait]
impl Notifier for Peripheral {
    async fn notify(
        &self,
        client: &str,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> Result<(), Error> {
        let writer = match self.writers.lock() {
            Ok(writers) => writers.get(&(characteristic, client.to_string())).cloned(),
            Err(err) => return Err(Error::from_string(err.to_string(), ErrorType::Bluez)),
        };
        let Some(writer) = writer else {
            return Err(Error::from_string(
                format!("no notify session for {client} on {characteristic}"),
                ErrorType::Notification,
            ));
        };
        match tokio::time::timeout(NOTIFY_TIMEOUT, writer.send(&value)).await {
            Ok(sent) => {
                sent.map_err(|err| Error::from_string(err.to_string(), ErrorType::Notification))
            }
            Err(_) => Err(Error::from_string(
                format!("notification to {client} timed out"),
                ErrorType::Notification,
            )),
        }
    }
}

/// Reports `Connected` changes of one device until it disappears from the adapter.
fn watch_device(
    adapter: &Adapter,
    address: Address,
    sender: Sender<PeripheralEvent>,
    watched: Arc<Mutex<HashSet<Address>>>,
) {
    match watched.lock() {
        Ok(mut watched) => {
            if !watched.insert(address) {
                return;
            }
        }
        Err(_) => {
            log::error!("Failed to lock watched devices");
            return;
        }
    }

    let device = match adapter.device(address) {
        Ok(device) => device,
        Err(err) => {
            log::error!("Error looking up device {address}: {err}");
            return;
        }
    };

    tokio::spawn(async move {
        match device.events().await {
            Ok(events) => {
                let mut events = Box::pin(events);
                while let Some(event) = events.next().await {
                    if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event
                    {
                        if !send_connection(&sender, address, connected).await {
                            break;
                        }
                    }
                }
            }
            Err(err) => log::error!("Error watching device {address}: {err}"),
        }
        if let Ok(mut watched) = watched.lock() {
            watched.remove(&address);
        }
    });
}

async fn send_connection(
    sender: &Sender<PeripheralEvent>,
    address: Address,
    connected: bool,
) -> bool {
    match sender
        .send(PeripheralEvent::ConnectionUpdate {
            client: address.to_string(),
            connected,
        })
        .await
        .map_err(Error::from)
    {
        Ok(()) => true,
        Err(err) => {
            log::error!("Error sending connection event: {err}");
            false
        }
    }
}
