use super::{
    attribute_table::{
        CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, COUNTER_CHARACTERISTIC_UUID,
        DISABLE_NOTIFICATION_VALUE, ENABLE_NOTIFICATION_VALUE, INTERACTOR_CHARACTERISTIC_UUID,
    },
    dispatcher::{DispatchReport, NotificationDispatcher, Notifier},
    registry::SubscriptionRegistry,
    state::CounterState,
};
use crate::{
    config::ConfigurationWritePolicy,
    gatt::{
        characteristic::Characteristic,
        peripheral_event::{
            DescriptorRequest, PeripheralEvent, PeripheralRequest, ReadRequestResponse,
            RequestResponse, WriteRequestResponse,
        },
        properties::CharacteristicProperty,
        service::Service,
    },
};
use std::{fmt::Debug, sync::Arc};
use tokio::{
    sync::{mpsc::Receiver, oneshot},
    task::JoinHandle,
};
use uuid::Uuid;

/// Services attribute requests for the counter service.
///
/// Every request that carries a responder is answered exactly once, whether it is applied or
/// rejected. Rejected requests never touch the counter or the subscriptions. Notification
/// rounds run on their own tasks, so a central that stops draining its notifications never
/// holds up the requests behind it.
pub struct GattServerEngine<N> {
    service: Arc<Service>,
    counter: Arc<CounterState>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<NotificationDispatcher<N>>,
    configuration_write_policy: ConfigurationWritePolicy,
}

impl<N: Notifier + 'static> GattServerEngine<N> {
    pub fn new(
        service: Arc<Service>,
        counter: Arc<CounterState>,
        registry: Arc<SubscriptionRegistry>,
        notifier: N,
        configuration_write_policy: ConfigurationWritePolicy,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            notifier,
            registry.clone(),
            COUNTER_CHARACTERISTIC_UUID,
        ));
        GattServerEngine {
            service,
            counter,
            registry,
            dispatcher,
            configuration_write_policy,
        }
    }

    pub fn counter(&self) -> &Arc<CounterState> {
        &self.counter
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Handles events until every sender of the channel is dropped.
    pub async fn run(&self, mut receiver: Receiver<PeripheralEvent>) {
        while let Some(event) = receiver.recv().await {
            self.handle_event(event).await;
        }
        log::info!("Peripheral event channel closed");
    }

    /// Services one event. If it moved the counter, returns the spawned notification round.
    pub async fn handle_event(&self, event: PeripheralEvent) -> Option<JoinHandle<DispatchReport>> {
        match event {
            PeripheralEvent::StateUpdate { is_powered } => {
                log::info!("Adapter powered: {is_powered}");
            }
            PeripheralEvent::ConnectionUpdate { client, connected } => {
                self.on_connection_update(&client, connected);
            }
            PeripheralEvent::ReadRequest {
                request,
                offset,
                responder,
            } => {
                let response = self.on_read(&request, offset);
                log::debug!(
                    "ReadRequest: {request:?} Offset: {offset} -> {:#04x}",
                    response.response.att_code()
                );
                respond(responder, response);
            }
            PeripheralEvent::WriteRequest {
                request,
                value,
                offset,
                responder,
            } => {
                log::debug!("WriteRequest: {request:?} Value: {value:?} Offset: {offset}");
                let (response, new_value) = self.on_write(&request, offset);
                if let Some(responder) = responder {
                    respond(responder, WriteRequestResponse { response });
                }
                return new_value.map(|value| self.spawn_dispatch(value));
            }
            PeripheralEvent::DescriptorReadRequest {
                request,
                offset,
                responder,
            } => {
                let response = self.on_descriptor_read(&request, offset);
                log::debug!(
                    "DescriptorReadRequest: {request:?} Offset: {offset} -> {:#04x}",
                    response.response.att_code()
                );
                respond(responder, response);
            }
            PeripheralEvent::DescriptorWriteRequest {
                request,
                value,
                offset,
                responder,
            } => {
                let response = self.on_descriptor_write(&request, &value, offset);
                log::debug!(
                    "DescriptorWriteRequest: {request:?} Value: {value:?} Offset: {offset} -> {:#04x}",
                    response.att_code()
                );
                if let Some(responder) = responder {
                    respond(responder, WriteRequestResponse { response });
                }
            }
        }
        None
    }

    /// Increments the counter and notifies subscribers, as an interactor write would.
    pub async fn bump(&self) -> DispatchReport {
        let value = self.counter.increment();
        self.dispatcher.dispatch(value).await
    }

    fn spawn_dispatch(&self, value: u64) -> JoinHandle<DispatchReport> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch(value).await })
    }

    fn on_connection_update(&self, client: &str, connected: bool) {
        if connected {
            log::info!("Central connected: {client}");
            return;
        }
        if self.registry.remove_on_disconnect(client) {
            log::info!("Central disconnected: {client}, notifications disabled");
        } else {
            log::info!("Central disconnected: {client}");
        }
    }

    fn on_read(&self, request: &PeripheralRequest, offset: u64) -> ReadRequestResponse {
        let Some(characteristic) = self.characteristic(&request.service, &request.characteristic)
        else {
            return ReadRequestResponse::error(RequestResponse::InvalidHandle);
        };
        if !characteristic.has_property(CharacteristicProperty::Read) {
            return ReadRequestResponse::error(RequestResponse::ReadNotPermitted);
        }
        // The value is a single byte, so any offset past its start is out of range.
        if offset != 0 {
            return ReadRequestResponse::error(RequestResponse::InvalidOffset);
        }

        if characteristic.uuid == COUNTER_CHARACTERISTIC_UUID {
            ReadRequestResponse::success(self.counter.encoded())
        } else {
            ReadRequestResponse::error(RequestResponse::UnlikelyError)
        }
    }

    /// Returns the response status and, if the counter moved, its new value.
    fn on_write(&self, request: &PeripheralRequest, offset: u64) -> (RequestResponse, Option<u64>) {
        let Some(characteristic) = self.characteristic(&request.service, &request.characteristic)
        else {
            return (RequestResponse::InvalidHandle, None);
        };
        if !characteristic.is_writable() {
            return (RequestResponse::WriteNotPermitted, None);
        }
        if offset != 0 {
            return (RequestResponse::InvalidOffset, None);
        }

        if characteristic.uuid == INTERACTOR_CHARACTERISTIC_UUID {
            let value = self.counter.increment();
            log::info!("Counter incremented to {value} by {}", request.client);
            (RequestResponse::Success, Some(value))
        } else {
            (RequestResponse::UnlikelyError, None)
        }
    }

    fn on_descriptor_read(&self, request: &DescriptorRequest, offset: u64) -> ReadRequestResponse {
        if !self.is_configuration_descriptor(request) {
            return ReadRequestResponse::error(RequestResponse::InvalidHandle);
        }
        if offset != 0 {
            return ReadRequestResponse::error(RequestResponse::InvalidOffset);
        }

        let value = if self.registry.contains(&request.client) {
            ENABLE_NOTIFICATION_VALUE
        } else {
            DISABLE_NOTIFICATION_VALUE
        };
        ReadRequestResponse::success(value.to_vec())
    }

    fn on_descriptor_write(
        &self,
        request: &DescriptorRequest,
        value: &[u8],
        offset: u64,
    ) -> RequestResponse {
        if !self.is_configuration_descriptor(request) {
            return RequestResponse::InvalidHandle;
        }
        if offset != 0 {
            return RequestResponse::InvalidOffset;
        }

        if value == ENABLE_NOTIFICATION_VALUE {
            if self.registry.subscribe(&request.client) {
                log::info!("Notifications enabled for {}", request.client);
            }
            RequestResponse::Success
        } else if value == DISABLE_NOTIFICATION_VALUE {
            if self.registry.unsubscribe(&request.client) {
                log::info!("Notifications disabled for {}", request.client);
            }
            RequestResponse::Success
        } else {
            match self.configuration_write_policy {
                ConfigurationWritePolicy::Ignore => {
                    log::warn!(
                        "Ignoring configuration value {value:?} from {}",
                        request.client
                    );
                    RequestResponse::Success
                }
                ConfigurationWritePolicy::Reject if value.len() != 2 => {
                    RequestResponse::InvalidAttributeValueLength
                }
                ConfigurationWritePolicy::Reject => RequestResponse::ImproperlyConfigured,
            }
        }
    }

    fn characteristic(
        &self,
        service: &Uuid,
        characteristic: &Uuid,
    ) -> Option<&Characteristic> {
        if *service != self.service.uuid {
            return None;
        }
        self.service.characteristic(*characteristic)
    }

    fn is_configuration_descriptor(&self, request: &DescriptorRequest) -> bool {
        request.descriptor == CLIENT_CHARACTERISTIC_CONFIGURATION_UUID
            && self
                .characteristic(&request.service, &request.characteristic)
                .and_then(|c| c.descriptor(request.descriptor))
                .is_some()
    }
}

fn respond<T: Debug>(responder: oneshot::Sender<T>, response: T) {
    if let Err(response) = responder.send(response) {
        log::debug!("Requester went away before {response:?} could be sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{
        attribute_table::{self, SERVICE_UUID},
        testing::{RecordingNotifier, StalledNotifier},
    };
    use crate::gatt::properties::AttributePermission;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const A: &str = "AA:AA:AA:AA:AA:AA";
    const B: &str = "BB:BB:BB:BB:BB:BB";
    const C: &str = "CC:CC:CC:CC:CC:CC";

    fn engine_with(
        policy: ConfigurationWritePolicy,
    ) -> (GattServerEngine<Arc<RecordingNotifier>>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = GattServerEngine::new(
            Arc::new(attribute_table::build()),
            Arc::new(CounterState::new()),
            Arc::new(SubscriptionRegistry::new()),
            notifier.clone(),
            policy,
        );
        (engine, notifier)
    }

    fn engine() -> (GattServerEngine<Arc<RecordingNotifier>>, Arc<RecordingNotifier>) {
        engine_with(ConfigurationWritePolicy::Ignore)
    }

    fn char_request(client: &str, characteristic: Uuid) -> PeripheralRequest {
        PeripheralRequest {
            client: client.to_string(),
            service: SERVICE_UUID,
            characteristic,
        }
    }

    fn cccd_request(client: &str) -> DescriptorRequest {
        DescriptorRequest {
            client: client.to_string(),
            service: SERVICE_UUID,
            characteristic: COUNTER_CHARACTERISTIC_UUID,
            descriptor: CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
        }
    }

    async fn read(
        engine: &GattServerEngine<Arc<RecordingNotifier>>,
        request: PeripheralRequest,
        offset: u64,
    ) -> ReadRequestResponse {
        let (responder, rx) = oneshot::channel();
        engine
            .handle_event(PeripheralEvent::ReadRequest {
                request,
                offset,
                responder,
            })
            .await;
        rx.await.expect("read request must be answered")
    }

    async fn write_command(
        engine: &GattServerEngine<Arc<RecordingNotifier>>,
        client: &str,
    ) -> Option<JoinHandle<DispatchReport>> {
        engine
            .handle_event(PeripheralEvent::WriteRequest {
                request: char_request(client, INTERACTOR_CHARACTERISTIC_UUID),
                value: vec![0x42],
                offset: 0,
                responder: None,
            })
            .await
    }

    async fn write_cccd(
        engine: &GattServerEngine<Arc<RecordingNotifier>>,
        client: &str,
        value: &[u8],
    ) -> RequestResponse {
        let (responder, rx) = oneshot::channel();
        engine
            .handle_event(PeripheralEvent::DescriptorWriteRequest {
                request: cccd_request(client),
                value: value.to_vec(),
                offset: 0,
                responder: Some(responder),
            })
            .await;
        rx.await.expect("descriptor write must be answered").response
    }

    #[tokio::test]
    async fn read_counter_returns_single_byte() {
        let (engine, _) = engine();
        let response = read(&engine, char_request(A, COUNTER_CHARACTERISTIC_UUID), 0).await;
        assert_eq!(response, ReadRequestResponse::success(vec![0x00]));
    }

    #[tokio::test]
    async fn read_reflects_latest_increment() {
        let (engine, _) = engine();
        write_command(&engine, B).await;
        write_command(&engine, B).await;

        let response = read(&engine, char_request(A, COUNTER_CHARACTERISTIC_UUID), 0).await;
        assert_eq!(response.value, vec![0x02]);
    }

    #[tokio::test]
    async fn read_with_offset_is_rejected() {
        let (engine, _) = engine();
        let response = read(&engine, char_request(A, COUNTER_CHARACTERISTIC_UUID), 1).await;
        assert_eq!(response.response, RequestResponse::InvalidOffset);
        assert!(response.value.is_empty());
    }

    #[tokio::test]
    async fn read_unknown_or_unreadable_attribute_is_rejected() {
        let (engine, _) = engine();
        let unknown = read(&engine, char_request(A, Uuid::from_u128(1)), 0).await;
        assert_eq!(unknown.response, RequestResponse::InvalidHandle);

        let interactor = read(&engine, char_request(A, INTERACTOR_CHARACTERISTIC_UUID), 0).await;
        assert_eq!(interactor.response, RequestResponse::ReadNotPermitted);

        let mut wrong_service = char_request(A, COUNTER_CHARACTERISTIC_UUID);
        wrong_service.service = Uuid::from_u128(2);
        let wrong_service = read(&engine, wrong_service, 0).await;
        assert_eq!(wrong_service.response, RequestResponse::InvalidHandle);
    }

    #[tokio::test]
    async fn interactor_writes_increment_by_one() {
        let (engine, _) = engine();
        for expected in 1..=5 {
            write_command(&engine, A).await;
            assert_eq!(engine.counter().read(), expected);
        }
    }

    #[tokio::test]
    async fn write_with_response_is_applied_and_answered() {
        let (engine, _) = engine();
        let (responder, rx) = oneshot::channel();
        engine
            .handle_event(PeripheralEvent::WriteRequest {
                request: char_request(A, INTERACTOR_CHARACTERISTIC_UUID),
                value: Vec::new(),
                offset: 0,
                responder: Some(responder),
            })
            .await;

        assert_eq!(rx.await.unwrap().response, RequestResponse::Success);
        assert_eq!(engine.counter().read(), 1);
    }

    #[tokio::test]
    async fn interactor_write_with_offset_is_rejected_without_mutation() {
        let (engine, notifier) = engine();
        engine.registry().subscribe(A);
        let (responder, rx) = oneshot::channel();
        let round = engine
            .handle_event(PeripheralEvent::WriteRequest {
                request: char_request(B, INTERACTOR_CHARACTERISTIC_UUID),
                value: vec![0x01],
                offset: 3,
                responder: Some(responder),
            })
            .await;

        assert!(round.is_none());
        assert_eq!(rx.await.unwrap().response, RequestResponse::InvalidOffset);
        assert_eq!(engine.counter().read(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn characteristic_without_a_value_source_fails_the_request() {
        let extra = Uuid::from_u128(0xe7a0);
        let mut service = attribute_table::build();
        service.characteristics.push(Characteristic {
            uuid: extra,
            properties: vec![CharacteristicProperty::Read, CharacteristicProperty::Write],
            permissions: vec![AttributePermission::Readable, AttributePermission::Writeable],
            descriptors: Vec::new(),
        });
        let engine = GattServerEngine::new(
            Arc::new(service),
            Arc::new(CounterState::new()),
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(RecordingNotifier::default()),
            ConfigurationWritePolicy::Ignore,
        );

        let response = read(&engine, char_request(A, extra), 0).await;
        assert_eq!(response.response, RequestResponse::UnlikelyError);

        let (responder, rx) = oneshot::channel();
        let round = engine
            .handle_event(PeripheralEvent::WriteRequest {
                request: char_request(A, extra),
                value: vec![0x01],
                offset: 0,
                responder: Some(responder),
            })
            .await;
        assert!(round.is_none());
        assert_eq!(rx.await.unwrap().response, RequestResponse::UnlikelyError);
        assert_eq!(engine.counter().read(), 0);
    }

    #[tokio::test]
    async fn write_to_counter_is_rejected_without_mutation() {
        let (engine, notifier) = engine();
        engine.registry().subscribe(A);
        let (responder, rx) = oneshot::channel();
        engine
            .handle_event(PeripheralEvent::WriteRequest {
                request: char_request(A, COUNTER_CHARACTERISTIC_UUID),
                value: vec![9],
                offset: 0,
                responder: Some(responder),
            })
            .await;

        assert_eq!(rx.await.unwrap().response, RequestResponse::WriteNotPermitted);
        assert_eq!(engine.counter().read(), 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn enable_and_disable_toggle_subscription() {
        let (engine, _) = engine();

        assert_eq!(
            write_cccd(&engine, A, &ENABLE_NOTIFICATION_VALUE).await,
            RequestResponse::Success
        );
        assert!(engine.registry().contains(A));

        assert_eq!(
            write_cccd(&engine, A, &ENABLE_NOTIFICATION_VALUE).await,
            RequestResponse::Success
        );
        assert_eq!(engine.registry().len(), 1);

        assert_eq!(
            write_cccd(&engine, A, &DISABLE_NOTIFICATION_VALUE).await,
            RequestResponse::Success
        );
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn unknown_configuration_value_is_ignored_by_default() {
        let (engine, _) = engine();
        engine.registry().subscribe(A);

        assert_eq!(
            write_cccd(&engine, A, &[0x02, 0x00]).await,
            RequestResponse::Success
        );
        assert_eq!(write_cccd(&engine, B, &[0x01]).await, RequestResponse::Success);
        assert_eq!(engine.registry().snapshot(), vec![A]);
    }

    #[tokio::test]
    async fn unknown_configuration_value_can_be_rejected() {
        let (engine, _) = engine_with(ConfigurationWritePolicy::Reject);
        engine.registry().subscribe(A);

        assert_eq!(
            write_cccd(&engine, A, &[0x02, 0x00]).await,
            RequestResponse::ImproperlyConfigured
        );
        assert_eq!(
            write_cccd(&engine, B, &[0x01, 0x00, 0x00]).await,
            RequestResponse::InvalidAttributeValueLength
        );
        assert_eq!(engine.registry().snapshot(), vec![A]);
    }

    #[tokio::test]
    async fn configuration_write_without_response_is_not_answered() {
        let (engine, _) = engine();
        engine
            .handle_event(PeripheralEvent::DescriptorWriteRequest {
                request: cccd_request(A),
                value: ENABLE_NOTIFICATION_VALUE.to_vec(),
                offset: 0,
                responder: None,
            })
            .await;
        assert!(engine.registry().contains(A));
    }

    #[tokio::test]
    async fn descriptor_write_on_unknown_descriptor_is_rejected() {
        let (engine, _) = engine();
        let (responder, rx) = oneshot::channel();
        let mut request = cccd_request(A);
        request.characteristic = INTERACTOR_CHARACTERISTIC_UUID;
        engine
            .handle_event(PeripheralEvent::DescriptorWriteRequest {
                request,
                value: ENABLE_NOTIFICATION_VALUE.to_vec(),
                offset: 0,
                responder: Some(responder),
            })
            .await;

        assert_eq!(rx.await.unwrap().response, RequestResponse::InvalidHandle);
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn descriptor_read_reports_configuration_per_device() {
        let (engine, _) = engine();
        engine.registry().subscribe(A);

        for (client, expected) in [(A, ENABLE_NOTIFICATION_VALUE), (B, DISABLE_NOTIFICATION_VALUE)] {
            let (responder, rx) = oneshot::channel();
            engine
                .handle_event(PeripheralEvent::DescriptorReadRequest {
                    request: cccd_request(client),
                    offset: 0,
                    responder,
                })
                .await;
            assert_eq!(rx.await.unwrap(), ReadRequestResponse::success(expected.to_vec()));
        }
    }

    #[tokio::test]
    async fn write_notifies_every_subscriber_with_new_value() {
        let (engine, notifier) = engine();
        for _ in 0..5 {
            engine.counter().increment();
        }
        for client in [A, B, C] {
            write_cccd(&engine, client, &ENABLE_NOTIFICATION_VALUE).await;
        }

        let round = write_command(&engine, "DD:DD:DD:DD:DD:DD")
            .await
            .expect("an applied write starts a notification round");
        let report = round.await.unwrap();

        assert_eq!(report.delivered, vec![A, B, C]);
        assert_eq!(
            notifier.sent(),
            vec![
                (A.to_string(), COUNTER_CHARACTERISTIC_UUID, vec![0x06]),
                (B.to_string(), COUNTER_CHARACTERISTIC_UUID, vec![0x06]),
                (C.to_string(), COUNTER_CHARACTERISTIC_UUID, vec![0x06]),
            ]
        );
    }

    #[tokio::test]
    async fn disconnect_prunes_subscription() {
        let (engine, notifier) = engine();
        write_cccd(&engine, A, &ENABLE_NOTIFICATION_VALUE).await;
        write_cccd(&engine, B, &ENABLE_NOTIFICATION_VALUE).await;

        engine
            .handle_event(PeripheralEvent::ConnectionUpdate {
                client: A.to_string(),
                connected: false,
            })
            .await;
        engine.bump().await;

        let recipients: Vec<String> = notifier.sent().into_iter().map(|(d, _, _)| d).collect();
        assert_eq!(recipients, vec![B]);
    }

    #[tokio::test]
    async fn dropped_responder_does_not_stop_the_engine() {
        let (engine, _) = engine();
        let (responder, rx) = oneshot::channel();
        drop(rx);
        engine
            .handle_event(PeripheralEvent::ReadRequest {
                request: char_request(A, COUNTER_CHARACTERISTIC_UUID),
                offset: 0,
                responder,
            })
            .await;

        let response = read(&engine, char_request(A, COUNTER_CHARACTERISTIC_UUID), 0).await;
        assert_eq!(response.response, RequestResponse::Success);
    }

    #[tokio::test]
    async fn stalled_central_does_not_hold_up_later_requests() {
        let engine = Arc::new(GattServerEngine::new(
            Arc::new(attribute_table::build()),
            Arc::new(CounterState::new()),
            Arc::new(SubscriptionRegistry::new()),
            StalledNotifier,
            ConfigurationWritePolicy::Ignore,
        ));
        engine.registry().subscribe("SLOW");

        let (tx, rx) = mpsc::channel(8);
        let server = engine.clone();
        let running = tokio::spawn(async move { server.run(rx).await });

        tx.send(PeripheralEvent::WriteRequest {
            request: char_request(B, INTERACTOR_CHARACTERISTIC_UUID),
            value: Vec::new(),
            offset: 0,
            responder: None,
        })
        .await
        .unwrap();
        let (read_tx, read_rx) = oneshot::channel();
        tx.send(PeripheralEvent::ReadRequest {
            request: char_request(A, COUNTER_CHARACTERISTIC_UUID),
            offset: 0,
            responder: read_tx,
        })
        .await
        .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(2), read_rx)
            .await
            .expect("read must be answered while a notification is stuck")
            .unwrap();
        assert_eq!(response, ReadRequestResponse::success(vec![0x01]));

        drop(tx);
        running.await.unwrap();
    }

    #[tokio::test]
    async fn run_drains_channel_until_closed() {
        let (engine, _) = engine();
        let (tx, rx) = mpsc::channel(8);
        for _ in 0..3 {
            tx.send(PeripheralEvent::WriteRequest {
                request: char_request(A, INTERACTOR_CHARACTERISTIC_UUID),
                value: Vec::new(),
                offset: 0,
                responder: None,
            })
            .await
            .unwrap();
        }
        drop(tx);

        engine.run(rx).await;
        assert_eq!(engine.counter().read(), 3);
    }
}
