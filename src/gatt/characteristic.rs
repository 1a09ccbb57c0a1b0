use super::{
    descriptor::Descriptor,
    properties::{AttributePermission, CharacteristicProperty},
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    pub permissions: Vec<AttributePermission>,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn has_property(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn is_writable(&self) -> bool {
        self.properties.iter().any(CharacteristicProperty::is_write)
    }

    pub fn is_notifiable(&self) -> bool {
        self.properties.iter().any(CharacteristicProperty::is_notify)
    }

    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }
}

impl Default for Characteristic {
    fn default() -> Self {
        Characteristic {
            uuid: Uuid::nil(),
            properties: vec![CharacteristicProperty::Read],
            permissions: vec![AttributePermission::Readable],
            descriptors: Vec::new(),
        }
    }
}
