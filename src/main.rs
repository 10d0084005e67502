use color_eyre::{eyre::eyre, Result};
use rovlink::command::{CommandChannel, CommandSink, RecordingSink};
use rovlink::config::LinkConfig;
use rovlink::controller::ControllerHandle;
use rovlink::telemetry::{
    CodecRecordFormat, InertialFormat, MemoryStore, RecordForwarder, ResourceStatsFormat,
    TelemetryReceiver, TelemetryStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const CONTROLLER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    // optional first argument: config file path
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let (config, path) = LinkConfig::load_or_default(explicit)
        .await
        .map_err(|e| eyre!("Failed to load config: {}", e))?;
    setup_logging(config.log_level()?);
    info!("Loaded config from {}", path.display());

    let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
    if config.command.dry_run {
        info!("Dry run: commands are recorded, not sent");
        run_station(config, Arc::new(RecordingSink::new()), store).await
    } else {
        let channel = CommandChannel::from_config(&config.command)?;
        run_station(config, Arc::new(channel), store).await
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn run_station<S: CommandSink>(
    config: LinkConfig,
    sink: Arc<S>,
    store: Arc<dyn TelemetryStore>,
) -> Result<()> {
    sink.start()
        .await
        .map_err(|e| eyre!("Failed to start command sink: {}", e))?;

    let resource = TelemetryReceiver::new(
        ResourceStatsFormat,
        &config.resource.host,
        config.resource.port,
        config.resource.recv_timeout(),
        store.clone(),
    )?;
    resource.start().await?;

    let inertial_socket = config.inertial.receiver();
    let inertial = TelemetryReceiver::new(
        InertialFormat::new(
            config.inertial.accel_lsb_per_g,
            config.inertial.gyro_lsb_per_dps,
        ),
        &inertial_socket.host,
        inertial_socket.port,
        inertial_socket.recv_timeout(),
        store.clone(),
    )?;
    inertial.start().await?;

    let forwarder = if config.forwarder.enabled {
        let forwarder = RecordForwarder::new(
            &config.forwarder.host,
            config.forwarder.port,
            config.forwarder.rate_hz,
            store.clone(),
        )?;
        forwarder.start().await?;
        Some(forwarder)
    } else {
        None
    };

    let record = if config.record.enabled {
        let socket = config.record.receiver();
        let record = TelemetryReceiver::new(
            CodecRecordFormat::new(),
            &socket.host,
            socket.port,
            socket.recv_timeout(),
            store.clone(),
        )?;
        record.start().await?;
        Some(record)
    } else {
        None
    };

    let mut controller = if config.controller.enabled {
        match ControllerHandle::spawn_gilrs(config.controller.clone(), sink.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Continuing without controller: {}", e);
                None
            }
        }
    } else {
        info!("Controller disabled in config");
        None
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status = tokio::time::interval(config.status_interval());
    status.tick().await;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
            _ = status.tick() => {
                let command = sink.get_command();
                let resources = resource.get_stats();
                let imu = inertial.get_stats();
                let link = controller
                    .as_ref()
                    .map(|handle| handle.status().to_string())
                    .unwrap_or_else(|| "none".to_string());
                info!(
                    "seq {} sent {} send errors {} | resource rx {} lost {} crc {} | 9dof rx {} lost {} | controller {}",
                    command.sequence,
                    command.packets_sent,
                    command.send_errors,
                    resources.packets_received,
                    resources.packets_lost,
                    resources.crc_errors,
                    imu.packets_received,
                    imu.packets_lost,
                    link
                );
                if let Some(forwarder) = &forwarder {
                    let (sent, errors) = forwarder.counters();
                    info!("Forwarded {} records, {} errors", sent, errors);
                }
                if let Some(record) = &record {
                    let records = record.get_stats();
                    info!(
                        "Relayed records rx {} malformed {}",
                        records.packets_received, records.malformed
                    );
                }
            }
        }
    }

    if let Some(handle) = controller.as_mut() {
        handle.stop(CONTROLLER_STOP_TIMEOUT).await;
    }
    if let Some(record) = &record {
        record.stop().await;
    }
    if let Some(forwarder) = &forwarder {
        forwarder.stop().await;
    }
    inertial.stop().await;
    resource.stop().await;
    sink.stop().await;
    info!("Station stopped");
    Ok(())
}
