use super::bluez_utils::{CharNotifyHandler, Writers};
use crate::counter::attribute_table::{
    CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE,
};
use crate::error::Error;
use crate::gatt::peripheral_event::{
    DescriptorRequest, PeripheralEvent, PeripheralRequest, ReadRequestResponse, RequestResponse,
    WriteRequestResponse,
};
use crate::gatt::properties::{AttributePermission, CharacteristicProperty};
use crate::gatt::{characteristic, service};
use crate::uuid::ShortUuid;
use bluer::gatt::local::{
    characteristic_control, service_control, Characteristic, CharacteristicControl,
    CharacteristicControlEvent, CharacteristicControlHandle, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, ReqError, Service,
};
use bluer::gatt::WriteOp;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use uuid::Uuid;

pub(crate) fn parse_service(
    service: &service::Service,
    sender_tx: Sender<PeripheralEvent>,
) -> (Vec<CharNotifyHandler>, Service) {
    let (_, service_handle) = service_control();
    let mut characteristics: Vec<Characteristic> = Vec::new();
    let mut char_notify_handlers: Vec<CharNotifyHandler> = Vec::new();

    for char in &service.characteristics {
        let (characteristic, control) = parse_characteristic(char, service.uuid, sender_tx.clone());

        if let Some(control) = control {
            char_notify_handlers.push(CharNotifyHandler {
                service_uuid: service.uuid,
                characteristic_uuid: char.uuid,
                control,
            });
        }

        characteristics.push(characteristic);
    }

    let service = Service {
        uuid: service.uuid,
        primary: service.primary,
        characteristics,
        control_handle: service_handle,
        ..Default::default()
    };
    (char_notify_handlers, service)
}

fn parse_characteristic(
    characteristic: &characteristic::Characteristic,
    service_uuid: Uuid,
    sender_tx: Sender<PeripheralEvent>,
) -> (Characteristic, Option<CharacteristicControl>) {
    // bluetoothd owns the configuration descriptor of every notifying characteristic and
    // reports it through notify sessions instead.
    for descriptor in &characteristic.descriptors {
        if descriptor.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION_UUID {
            log::debug!(
                "Descriptor {:#06x} of {} is served by bluetoothd",
                descriptor.uuid.to_short().unwrap_or_default(),
                characteristic.uuid
            );
        } else {
            log::warn!(
                "Skipping unsupported descriptor {} of {}",
                descriptor.uuid,
                characteristic.uuid
            );
        }
    }

    let char_notify = get_characteristic_notify(characteristic);

    let mut control: Option<CharacteristicControl> = None;
    let control_handle = match char_notify {
        Some(_) => {
            let (ctrl, handle) = characteristic_control();
            control = Some(ctrl);
            handle
        }
        None => CharacteristicControlHandle::default(),
    };

    let char = Characteristic {
        uuid: characteristic.uuid,
        read: get_characteristic_read(characteristic, service_uuid, sender_tx.clone()),
        write: get_characteristic_write(characteristic, service_uuid, sender_tx),
        notify: char_notify,
        broadcast: characteristic.has_property(CharacteristicProperty::Broadcast),
        control_handle,
        ..Default::default()
    };
    (char, control)
}

fn get_characteristic_read(
    characteristic: &characteristic::Characteristic,
    service_uuid: Uuid,
    sender_tx: Sender<PeripheralEvent>,
) -> Option<CharacteristicRead> {
    if !characteristic.has_property(CharacteristicProperty::Read) {
        return None;
    }

    let is_secure = characteristic
        .permissions
        .contains(&AttributePermission::ReadEncryptionRequired);
    let characteristic_uuid = characteristic.uuid;

    Some(CharacteristicRead {
        read: true,
        secure_read: is_secure,
        fun: Box::new(move |request: CharacteristicReadRequest| {
            let sender_tx = sender_tx.clone();
            async move {
                on_read_request(sender_tx, request, service_uuid, characteristic_uuid).await
            }
            .boxed()
        }),
        ..Default::default()
    })
}

fn get_characteristic_write(
    characteristic: &characteristic::Characteristic,
    service_uuid: Uuid,
    sender_tx: Sender<PeripheralEvent>,
) -> Option<CharacteristicWrite> {
    if !characteristic.is_writable() {
        return None;
    }

    let is_write_encryption = characteristic
        .permissions
        .contains(&AttributePermission::WriteEncryptionRequired);
    let characteristic_uuid = characteristic.uuid;

    Some(CharacteristicWrite {
        write: characteristic.has_property(CharacteristicProperty::Write),
        write_without_response: characteristic
            .has_property(CharacteristicProperty::WriteWithoutResponse),
        authenticated_signed_writes: characteristic
            .has_property(CharacteristicProperty::AuthenticatedSignedWrites),
        secure_write: is_write_encryption,
        method: CharacteristicWriteMethod::Fun(Box::new(
            move |value: Vec<u8>, request: CharacteristicWriteRequest| {
                let sender_tx = sender_tx.clone();
                async move {
                    on_write_request(sender_tx, request, service_uuid, characteristic_uuid, value)
                        .await
                }
                .boxed()
            },
        )),
        ..Default::default()
    })
}

fn get_characteristic_notify(
    characteristic: &characteristic::Characteristic,
) -> Option<CharacteristicNotify> {
    if !characteristic.is_notifiable() {
        return None;
    }

    let notify = characteristic.has_property(CharacteristicProperty::Notify)
        || characteristic.has_property(CharacteristicProperty::NotifyEncryptionRequired);
    let indicate = characteristic.has_property(CharacteristicProperty::Indicate)
        || characteristic.has_property(CharacteristicProperty::IndicateEncryptionRequired);

    Some(CharacteristicNotify {
        notify,
        indicate,
        method: CharacteristicNotifyMethod::Io,
        ..Default::default()
    })
}

/// Handle Requests
async fn on_read_request(
    sender_tx: Sender<PeripheralEvent>,
    request: CharacteristicReadRequest,
    service_uuid: Uuid,
    characteristic: Uuid,
) -> Result<Vec<u8>, ReqError> {
    let (res_tx, res_rx) = oneshot::channel::<ReadRequestResponse>();
    if let Err(err) = sender_tx
        .send(PeripheralEvent::ReadRequest {
            request: PeripheralRequest {
                client: request.device_address.to_string(),
                service: service_uuid,
                characteristic,
            },
            offset: request.offset as u64,
            responder: res_tx,
        })
        .await
        .map_err(Error::from)
    {
        log::error!("Error sending read request event: {err}");
        return Err(ReqError::Failed);
    }

    match res_rx.await {
        Ok(res) => match res.response.to_req_err() {
            Some(err) => Err(err),
            None => Ok(res.value),
        },
        Err(_) => Err(ReqError::Failed),
    }
}

async fn on_write_request(
    sender_tx: Sender<PeripheralEvent>,
    request: CharacteristicWriteRequest,
    service_uuid: Uuid,
    characteristic: Uuid,
    value: Vec<u8>,
) -> Result<(), ReqError> {
    let peripheral_request = PeripheralRequest {
        client: request.device_address.to_string(),
        service: service_uuid,
        characteristic,
    };
    let offset = request.offset as u64;

    // Write commands are never acknowledged, so there is nothing to wait for.
    if matches!(request.op_type, WriteOp::Command) {
        if let Err(err) = sender_tx
            .send(PeripheralEvent::WriteRequest {
                request: peripheral_request,
                value,
                offset,
                responder: None,
            })
            .await
            .map_err(Error::from)
        {
            log::error!("Error sending write command event: {err}");
        }
        return Ok(());
    }

    let (res_tx, res_rx) = oneshot::channel::<WriteRequestResponse>();
    if let Err(err) = sender_tx
        .send(PeripheralEvent::WriteRequest {
            request: peripheral_request,
            value,
            offset,
            responder: Some(res_tx),
        })
        .await
        .map_err(Error::from)
    {
        log::error!("Error sending write request event: {err}");
        return Err(ReqError::Failed);
    }

    match res_rx.await {
        Ok(res) => match res.response.to_req_err() {
            Some(err) => Err(err),
            None => Ok(()),
        },
        Err(_) => Err(ReqError::Failed),
    }
}

/// Forwards notify sessions as configuration descriptor writes: a session opening is an
/// "enable" from its device and its closing is a "disable".
pub(crate) fn spawn_notify_sessions(
    mut handler: CharNotifyHandler,
    sender_tx: Sender<PeripheralEvent>,
    writers: Writers,
) {
    tokio::spawn(async move {
        while let Some(event) = handler.control.next().await {
            let CharacteristicControlEvent::Notify(writer) = event else {
                continue;
            };
            let writer = Arc::new(writer);
            let request = DescriptorRequest {
                client: writer.device_address().to_string(),
                service: handler.service_uuid,
                characteristic: handler.characteristic_uuid,
                descriptor: CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
            };
            let key = (handler.characteristic_uuid, request.client.clone());

            match writers.lock() {
                Ok(mut writers) => {
                    writers.insert(key.clone(), writer.clone());
                }
                Err(_) => log::error!("Failed to lock writers for adding a writer"),
            }
            send_configuration(&sender_tx, request.clone(), &ENABLE_NOTIFICATION_VALUE).await;

            let sender_tx = sender_tx.clone();
            let writers = writers.clone();
            tokio::spawn(async move {
                if let Err(err) = writer.closed().await {
                    log::debug!("Notify session of {} closed: {err:?}", request.client);
                }
                match writers.lock() {
                    Ok(mut writers) => {
                        // A newer session from the same device may already have replaced it.
                        if writers.get(&key).is_some_and(|w| Arc::ptr_eq(w, &writer)) {
                            writers.remove(&key);
                        }
                    }
                    Err(_) => log::error!("Failed to lock writers for removing a writer"),
                }
                send_configuration(&sender_tx, request, &DISABLE_NOTIFICATION_VALUE).await;
            });
        }
    });
}

async fn send_configuration(
    sender_tx: &Sender<PeripheralEvent>,
    request: DescriptorRequest,
    value: &[u8],
) {
    if let Err(err) = sender_tx
        .send(PeripheralEvent::DescriptorWriteRequest {
            request,
            value: value.to_vec(),
            offset: 0,
            responder: None,
        })
        .await
        .map_err(Error::from)
    {
        log::error!("Error sending descriptor write event: {err}");
    }
}

impl RequestResponse {
    fn to_req_err(self) -> Option<ReqError> {
        match self {
            RequestResponse::Success => None,
            RequestResponse::InvalidHandle => Some(ReqError::Failed),
            RequestResponse::ReadNotPermitted => Some(ReqError::NotPermitted),
            RequestResponse::WriteNotPermitted => Some(ReqError::NotPermitted),
            RequestResponse::RequestNotSupported => Some(ReqError::NotSupported),
            RequestResponse::InvalidOffset => Some(ReqError::InvalidOffset),
            RequestResponse::InvalidAttributeValueLength => Some(ReqError::InvalidValueLength),
            RequestResponse::UnlikelyError => Some(ReqError::Failed),
            RequestResponse::ImproperlyConfigured => Some(ReqError::Failed),
        }
    }
}
