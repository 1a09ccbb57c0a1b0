use std::{
    io::{self, BufRead},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;

use ble_counter_peripheral::{
    config::{
        AdvertiseMode, ConfigurationWritePolicy, PeripheralConfig, DEFAULT_DEVICE_NAME,
        DEFAULT_EVENT_CHANNEL_CAPACITY,
    },
    counter::{
        attribute_table::{self, SERVICE_UUID},
        AdvertiserController, CounterState, GattServerEngine, SubscriptionRegistry,
    },
    error::Error,
    gatt::peripheral_event::PeripheralEvent,
    Peripheral, PeripheralImpl,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    LowPower,
    Balanced,
    LowLatency,
}

impl From<Mode> for AdvertiseMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::LowPower => AdvertiseMode::LowPower,
            Mode::Balanced => AdvertiseMode::Balanced,
            Mode::LowLatency => AdvertiseMode::LowLatency,
        }
    }
}

/// Advertise the counter service; every line typed on stdin bumps the counter locally.
#[derive(Debug, Parser)]
struct Args {
    /// Local name put in the advertisement.
    #[arg(long, env = "COUNTER_DEVICE_NAME", default_value = DEFAULT_DEVICE_NAME)]
    name: String,

    #[arg(long, value_enum, default_value_t = Mode::Balanced)]
    advertise_mode: Mode,

    /// Answer unknown configuration descriptor values with an error instead of ignoring them.
    #[arg(long)]
    reject_unknown_configuration: bool,

    #[arg(long, default_value_t = DEFAULT_EVENT_CHANNEL_CAPACITY)]
    channel_capacity: usize,
}

impl From<Args> for PeripheralConfig {
    fn from(args: Args) -> Self {
        PeripheralConfig {
            device_name: args.name,
            advertise_mode: args.advertise_mode.into(),
            event_channel_capacity: args.channel_capacity,
            configuration_write_policy: if args.reject_unknown_configuration {
                ConfigurationWritePolicy::Reject
            } else {
                ConfigurationWritePolicy::Ignore
            },
        }
    }
}

#[tokio::main]
async fn main() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    if let Err(err) = pretty_env_logger::try_init() {
        eprintln!("WARNING: failed to initialize logging framework: {}", err);
    }

    let config = PeripheralConfig::from(Args::parse());
    if let Err(err) = start_app(config).await {
        log::error!("{err}");
        std::process::exit(1);
    }
}

async fn start_app(config: PeripheralConfig) -> Result<(), Error> {
    let (sender_tx, receiver_rx) = mpsc::channel::<PeripheralEvent>(config.event_channel_capacity);
    let peripheral = Arc::new(Peripheral::new(sender_tx).await?);

    while !peripheral.is_powered().await? {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let service = Arc::new(attribute_table::build());
    peripheral.add_service(&service).await?;
    log::info!("Service Added");

    let counter = Arc::new(CounterState::new());
    let engine = Arc::new(GattServerEngine::new(
        service,
        counter.clone(),
        Arc::new(SubscriptionRegistry::new()),
        peripheral.clone(),
        config.configuration_write_policy,
    ));

    let server = engine.clone();
    tokio::spawn(async move { server.run(receiver_rx).await });

    // Stands in for the display: follows the counter off the request path.
    let mut display = counter.subscribe();
    tokio::spawn(async move {
        while display.changed().await.is_ok() {
            let value = *display.borrow_and_update();
            println!("Counter: {value}");
        }
    });

    let mut advertiser = AdvertiserController::new(peripheral.clone(), config);
    if advertiser.start(SERVICE_UUID).await.is_err() {
        log::warn!("Not advertising; only already-known centrals can connect");
    }

    let (line_tx, mut line_rx) = mpsc::channel::<()>(16);
    tokio::task::spawn_blocking(move || {
        for line in io::stdin().lock().lines() {
            if let Err(err) = line {
                log::error!("Error reading from console: {}", err);
                break;
            }
            if line_tx.blocking_send(()).is_err() {
                break;
            }
        }
    });

    while line_rx.recv().await.is_some() {
        let report = engine.bump().await;
        log::info!(
            "Notified {} central(s), {} failed",
            report.delivered.len(),
            report.failed.len()
        );
    }

    advertiser.stop().await
}
