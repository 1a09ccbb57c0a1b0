use crate::error::{self, Error, ErrorType};
use bluer::gatt::local::CharacteristicControl;
use bluer::gatt::CharacteristicWriter;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

/// Open notify sessions, one per (characteristic, device address).
pub(crate) type Writers = Arc<Mutex<HashMap<(Uuid, String), Arc<CharacteristicWriter>>>>;

#[derive(Debug)]
pub(crate) struct CharNotifyHandler {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub control: CharacteristicControl,
}

impl From<bluer::Error> for error::Error {
    fn from(error: bluer::Error) -> Self {
        let error_type = match error.kind {
            bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
                ErrorType::PermissionDenied
            }
            _ => ErrorType::Bluez,
        };
        Error::from_string(error.to_string(), error_type)
    }
}
