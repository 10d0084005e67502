//! Record Forwarder - periodic codec records for the constrained consumer
//!
//! Every tick the forwarder gathers the codec's source sections from the
//! store, packs them into one fixed-width record and sends it over UDP.
//! Like the command channel it is fire-and-forget.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{TelemetryCodec, SOURCE_SECTIONS};
use super::store::TelemetryStore;
use crate::command::ChannelError;
use crate::worker::{period_from_rate, WorkerSlot};

const STOP_TIMEOUT: Duration = Duration::from_secs(1);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    errors: AtomicU64,
}

/// Periodic sender of codec records built from the shared store.
///
/// Every tick reads the codec's source sections, encodes one record and
/// sends it. Missing sections are encoded with their defaults, so the
/// consumer always gets a full record.
pub struct RecordForwarder {
    destination: SocketAddr,
    period: Duration,
    codec: TelemetryCodec,
    store: Arc<dyn TelemetryStore>,
    counters: Arc<Counters>,
    worker: WorkerSlot,
}

/// Collects the codec's input document from the store's sections
pub fn assemble_source(store: &dyn TelemetryStore) -> Value {
    let mut document = Map::new();
    for section in SOURCE_SECTIONS {
        let value = store.read_section(section);
        if !value.is_null() {
            document.insert(section.to_string(), value);
        }
    }
    Value::Object(document)
}

impl RecordForwarder {
    /// Creates a forwarder sending to `host:port` at `rate_hz`.
    ///
    /// # Errors
    ///
    /// Same checks as [`CommandChannel::new`](crate::command::CommandChannel::new):
    /// an unusable rate, port 0 or an unresolvable host.
    pub fn new(
        host: &str,
        port: u16,
        rate_hz: f64,
        store: Arc<dyn TelemetryStore>,
    ) -> Result<Self, ChannelError> {
        let period = period_from_rate(rate_hz).ok_or(ChannelError::InvalidRate(rate_hz))?;
        let invalid = |reason: String| ChannelError::InvalidDestination {
            host: host.to_string(),
            port,
            reason,
        };
        if port == 0 {
            return Err(invalid("port 0 is not a valid destination".to_string()));
        }
        let destination = (host, port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no address".to_string()))?;

        let codec = TelemetryCodec::new();
        info!(
            "Created record forwarder to {} at {} Hz ({} byte records)",
            destination,
            rate_hz,
            codec.record_size()
        );
        Ok(Self {
            destination,
            period,
            codec,
            store,
            counters: Arc::new(Counters::default()),
            worker: WorkerSlot::new(),
        })
    }

    /// Whether the send task is alive
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// `(records sent, send errors)`
    pub fn counters(&self) -> (u64, u64) {
        (
            self.counters.sent.load(Ordering::Relaxed),
            self.counters.errors.load(Ordering::Relaxed),
        )
    }

    /// Binds an ephemeral socket and spawns the send task. Does nothing if running.
    pub async fn start(&self) -> Result<(), ChannelError> {
        if self.is_running() {
            debug!("Record forwarder already running");
            return Ok(());
        }

        let bind_addr: SocketAddr = if self.destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(ChannelError::Bind)?;

        let task = ForwardTask {
            socket,
            destination: self.destination,
            period: self.period,
            codec: self.codec.clone(),
            store: self.store.clone(),
            counters: self.counters.clone(),
        };
        if self.worker.install(move |token| task.run(token)) {
            info!("Record forwarder started towards {}", self.destination);
        }
        Ok(())
    }

    /// Stops the send task. Safe to repeat.
    pub async fn stop(&self) {
        if self.worker.stop("Record forwarder", STOP_TIMEOUT).await {
            info!("Record forwarder stopped");
        }
    }
}

struct ForwardTask {
    socket: UdpSocket,
    destination: SocketAddr,
    period: Duration,
    codec: TelemetryCodec,
    store: Arc<dyn TelemetryStore>,
    counters: Arc<Counters>,
}

impl ForwardTask {
    async fn run(self, token: CancellationToken) {
        let mut failing = false;
        let mut last_log = Instant::now();

        while !token.is_cancelled() {
            let tick_start = Instant::now();

            let record = self.codec.encode(&assemble_source(self.store.as_ref()));
            match self.socket.send_to(&record, self.destination).await {
                Ok(_) => {
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    failing = false;
                }
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    if !failing {
                        warn!("Record forward to {} failed: {}", self.destination, e);
                        failing = true;
                    }
                }
            }

            if last_log.elapsed() >= STATS_INTERVAL {
                info!(
                    "Record forwarder: {} sent, {} errors",
                    self.counters.sent.load(Ordering::Relaxed),
                    self.counters.errors.load(Ordering::Relaxed)
                );
                last_log = Instant::now();
            }

            let sleep_for = self.period.saturating_sub(tick_start.elapsed());
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        debug!("Record forwarder loop exiting");
    }
}
