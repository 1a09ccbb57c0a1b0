use super::properties::AttributePermission;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub permissions: Vec<AttributePermission>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor {
            uuid: Uuid::nil(),
            permissions: vec![
                AttributePermission::Readable,
                AttributePermission::Writeable,
            ],
        }
    }
}
