use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_DEVICE_NAME: &str = "Things";
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Advertising interval profile, trading discovery latency against power draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvertiseMode {
    LowPower,
    #[default]
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    pub fn interval(&self) -> Duration {
        match self {
            AdvertiseMode::LowPower => Duration::from_millis(1000),
            AdvertiseMode::Balanced => Duration::from_millis(250),
            AdvertiseMode::LowLatency => Duration::from_millis(100),
        }
    }
}

/// What the engine does with a configuration descriptor write that is neither
/// "enable notifications" nor "disable notifications".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigurationWritePolicy {
    /// Leave the subscription untouched and answer success.
    #[default]
    Ignore,
    /// Leave the subscription untouched and answer with an ATT error.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
    pub connectable: bool,
    pub include_tx_power: bool,
    pub mode: AdvertiseMode,
    /// `None` advertises until stopped.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralConfig {
    pub device_name: String,
    pub advertise_mode: AdvertiseMode,
    pub event_channel_capacity: usize,
    pub configuration_write_policy: ConfigurationWritePolicy,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        PeripheralConfig {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            advertise_mode: AdvertiseMode::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            configuration_write_policy: ConfigurationWritePolicy::default(),
        }
    }
}

impl PeripheralConfig {
    pub fn advertising_parameters(&self, service_uuid: Uuid) -> AdvertisingParameters {
        AdvertisingParameters {
            local_name: self.device_name.clone(),
            service_uuids: vec![service_uuid],
            connectable: true,
            include_tx_power: false,
            mode: self.advertise_mode,
            timeout: None,
        }
    }
}
