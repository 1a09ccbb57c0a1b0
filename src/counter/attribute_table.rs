use crate::gatt::{
    characteristic::Characteristic,
    descriptor::Descriptor,
    properties::{AttributePermission, CharacteristicProperty},
    service::Service,
};
use uuid::Uuid;

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x795090c7_420d_4048_a24e_18e60180e23c);
pub const COUNTER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x31517c58_66bf_470c_b662_e352a6c80cba);
pub const INTERACTOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0b89d2d4_0ea6_4141_86bb_0c5fb91ab14a);
pub const CLIENT_CHARACTERISTIC_CONFIGURATION_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// The counter service: a readable, notifying counter and a write-only interactor that
/// bumps it.
pub fn build() -> Service {
    let counter = Characteristic {
        uuid: COUNTER_CHARACTERISTIC_UUID,
        properties: vec![CharacteristicProperty::Read, CharacteristicProperty::Notify],
        permissions: vec![AttributePermission::Readable],
        descriptors: vec![Descriptor {
            uuid: CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
            permissions: vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ],
        }],
    };

    let interactor = Characteristic {
        uuid: INTERACTOR_CHARACTERISTIC_UUID,
        properties: vec![CharacteristicProperty::WriteWithoutResponse],
        permissions: vec![AttributePermission::Writeable],
        descriptors: Vec::new(),
    };

    Service {
        uuid: SERVICE_UUID,
        primary: true,
        characteristics: vec![counter, interactor],
    }
}
