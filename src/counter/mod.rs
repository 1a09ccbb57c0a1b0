//! The counter service: attribute table, shared state and the GATT server built on them.

pub mod advertiser;
pub mod attribute_table;
pub mod dispatcher;
pub mod engine;
pub mod registry;
pub mod state;

pub use self::{
    advertiser::{AdvertiserController, AdvertisingState},
    dispatcher::{DispatchReport, NotificationDispatcher, Notifier},
    engine::GattServerEngine,
    registry::SubscriptionRegistry,
    state::CounterState,
};
