use uuid::Uuid;

const BASE_UUID_TAIL: &[u8; 8] = b"\x80\x00\x00\x80\x5F\x9B\x34\xFB";

/// Conversions between 16-bit SIG-assigned UUIDs and the Bluetooth base UUID.
pub trait ShortUuid {
    fn from_short(uuid: u16) -> Uuid;

    /// The 16-bit alias, if this UUID lives inside the Bluetooth base UUID range.
    fn to_short(&self) -> Option<u16>;
}

impl ShortUuid for Uuid {
    fn from_short(uuid: u16) -> Uuid {
        Uuid::from_fields(uuid.into(), 0, 0x1000, BASE_UUID_TAIL)
    }

    fn to_short(&self) -> Option<u16> {
        let (d1, d2, d3, d4) = self.as_fields();
        if d2 != 0 || d3 != 0x1000 || d4 != BASE_UUID_TAIL {
            return None;
        }
        u16::try_from(d1).ok()
    }
}
