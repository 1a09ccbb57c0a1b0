use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// The shared counter value.
///
/// The logical count is a `u64`; on the wire only its low byte is sent, so the encoded value
/// wraps back to `0x00` every 256 increments.
#[derive(Debug)]
pub struct CounterState {
    value: AtomicU64,
    changes: watch::Sender<u64>,
}

impl CounterState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        CounterState {
            value: AtomicU64::new(0),
            changes,
        }
    }

    pub fn read(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Adds one and returns the new value.
    pub fn increment(&self) -> u64 {
        let value = self.value.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        // Racing increments may publish out of order; keep the feed monotonic.
        self.changes.send_if_modified(|current| {
            if value > *current {
                *current = value;
                true
            } else {
                false
            }
        });
        value
    }

    pub fn encoded(&self) -> Vec<u8> {
        Self::encode(self.read())
    }

    pub fn encode(value: u64) -> Vec<u8> {
        vec![value as u8]
    }

    /// Change feed for presentation sinks. Always holds the latest published value.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::new()
    }
}
