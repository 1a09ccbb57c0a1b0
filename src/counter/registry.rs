use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard},
};

/// Centrals that currently want counter notifications, keyed by device address.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    devices: Mutex<HashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the device was not subscribed before.
    pub fn subscribe(&self, device: &str) -> bool {
        self.lock().insert(device.to_string())
    }

    /// Returns `true` if the device was subscribed before.
    pub fn unsubscribe(&self, device: &str) -> bool {
        self.lock().remove(device)
    }

    pub fn remove_on_disconnect(&self, device: &str) -> bool {
        self.unsubscribe(device)
    }

    pub fn contains(&self, device: &str) -> bool {
        self.lock().contains(device)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Point-in-time copy of the subscribed devices, sorted by address.
    pub fn snapshot(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.lock().iter().cloned().collect();
        devices.sort();
        devices
    }

    // Every critical section is a single set operation, so a poisoned set is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
