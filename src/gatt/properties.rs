#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    AuthenticatedSignedWrites,
    Notify,
    NotifyEncryptionRequired,
    Indicate,
    IndicateEncryptionRequired,
}

impl CharacteristicProperty {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            CharacteristicProperty::Write
                | CharacteristicProperty::WriteWithoutResponse
                | CharacteristicProperty::AuthenticatedSignedWrites
        )
    }

    pub fn is_notify(&self) -> bool {
        matches!(
            self,
            CharacteristicProperty::Notify
                | CharacteristicProperty::NotifyEncryptionRequired
                | CharacteristicProperty::Indicate
                | CharacteristicProperty::IndicateEncryptionRequired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributePermission {
    Readable,
    Writeable,
    ReadEncryptionRequired,
    WriteEncryptionRequired,
}
