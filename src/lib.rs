pub mod config;
pub mod counter;
pub mod error;
pub mod gatt;
pub mod uuid;

mod peripheral;
#[cfg(all(target_os = "linux", feature = "bluez"))]
pub use self::peripheral::Peripheral;
pub use self::peripheral::PeripheralImpl;
