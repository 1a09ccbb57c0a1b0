use crate::{config::PeripheralConfig, error::Error, peripheral::PeripheralImpl};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingState {
    Idle,
    Advertising,
    Failed,
}

/// Owns the advertising lifecycle. Advertising keeps running while centrals connect; it only
/// ends on [`AdvertiserController::stop`] or when the controller's peripheral goes away.
pub struct AdvertiserController<P> {
    peripheral: Arc<P>,
    config: PeripheralConfig,
    state: AdvertisingState,
}

impl<P: PeripheralImpl> AdvertiserController<P> {
    pub fn new(peripheral: Arc<P>, config: PeripheralConfig) -> Self {
        AdvertiserController {
            peripheral,
            config,
            state: AdvertisingState::Idle,
        }
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    /// A failure is logged and returned; the GATT server keeps serving connected centrals.
    pub async fn start(&mut self, service_uuid: Uuid) -> Result<(), Error> {
        if self.state == AdvertisingState::Advertising {
            log::debug!("Already advertising {service_uuid}");
            return Ok(());
        }

        let parameters = self.config.advertising_parameters(service_uuid);
        match self.peripheral.start_advertising(&parameters).await {
            Ok(()) => {
                log::info!(
                    "Advertising {} as {:?} every {:?}",
                    service_uuid,
                    parameters.local_name,
                    parameters.mode.interval()
                );
                self.state = AdvertisingState::Advertising;
                Ok(())
            }
            Err(err) => {
                log::error!("Error starting advertising: {err}");
                self.state = AdvertisingState::Failed;
                Err(err)
            }
        }
    }

    pub async fn stop(&mut self) -> Result<(), Error> {
        if self.state != AdvertisingState::Advertising {
            self.state = AdvertisingState::Idle;
            return Ok(());
        }

        if let Err(err) = self.peripheral.stop_advertising().await {
            log::error!("Error stopping advertising: {err}");
            return Err(err);
        }
        log::info!("Advertising stopped");
        self.state = AdvertisingState::Idle;
        Ok(())
    }
}
