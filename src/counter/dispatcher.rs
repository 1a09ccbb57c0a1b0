use super::{registry::SubscriptionRegistry, state::CounterState};
use crate::error::Error;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

/// Delivers a characteristic value notification to one connected central.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, client: &str, characteristic: Uuid, value: Vec<u8>)
        -> Result<(), Error>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(
        &self,
        client: &str,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> Result<(), Error> {
        (**self).notify(client, characteristic, value).await
    }
}

/// Outcome of one notification round.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

pub struct NotificationDispatcher<N> {
    notifier: N,
    registry: Arc<SubscriptionRegistry>,
    characteristic: Uuid,
}

impl<N: Notifier> NotificationDispatcher<N> {
    pub fn new(notifier: N, registry: Arc<SubscriptionRegistry>, characteristic: Uuid) -> Self {
        NotificationDispatcher {
            notifier,
            registry,
            characteristic,
        }
    }

    /// Sends `value` to every device subscribed at the time of the call. A failed send is
    /// logged and reported but never stops delivery to the other devices.
    pub async fn dispatch(&self, value: u64) -> DispatchReport {
        let devices = self.registry.snapshot();
        let payload = CounterState::encode(value);
        log::debug!(
            "Notifying {} subscriber(s) of {} = {payload:?}",
            devices.len(),
            self.characteristic
        );

        let sends = devices.into_iter().map(|device| {
            let payload = payload.clone();
            async move {
                let result = self
                    .notifier
                    .notify(&device, self.characteristic, payload)
                    .await;
                (device, result)
            }
        });

        let mut report = DispatchReport::default();
        for (device, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered.push(device),
                Err(err) => {
                    log::warn!("Error notifying {device}: {err}");
                    report.failed.push((device, err));
                }
            }
        }
        report
    }
}
