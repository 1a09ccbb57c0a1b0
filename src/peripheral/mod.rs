#[cfg(all(target_os = "linux", feature = "bluez"))]
mod bluez;
#[cfg(all(target_os = "linux", feature = "bluez"))]
pub use self::bluez::Peripheral;

use crate::{config::AdvertisingParameters, error::Error, gatt::service::Service};
use async_trait::async_trait;

/// A platform BLE stack acting as a GATT server.
///
/// Implementations report requests and connection changes as
/// [`PeripheralEvent`](crate::gatt::peripheral_event::PeripheralEvent)s over the channel they
/// were created with. Serving services and advertising are independent: a service added with
/// [`PeripheralImpl::add_service`] stays reachable whether or not advertising is running.
#[async_trait]
pub trait PeripheralImpl: Send + Sync {
    async fn is_powered(&self) -> Result<bool, Error>;

    async fn is_advertising(&self) -> Result<bool, Error>;

    async fn start_advertising(&self, parameters: &AdvertisingParameters) -> Result<(), Error>;

    async fn stop_advertising(&self) -> Result<(), Error>;

    async fn add_service(&self, service: &Service) -> Result<(), Error>;
}
