//! Telemetry Receiver - one UDP socket, one receive task, one format
//!
//! Each datagram goes through [`ReceiverCore::ingest`]: decode and
//! validate, then sequence-gap accounting, then the "last known good"
//! snapshot is replaced and the record is merged into the shared store.
//! Rejected datagrams only move counters.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::format::{PacketError, TelemetryFormat};
use super::store::TelemetryStore;
use crate::worker::{lock, WorkerSlot};

const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const STATS_INTERVAL: Duration = Duration::from_secs(10);
const ERROR_BACKOFF: Duration = Duration::from_millis(100);
const RECV_BUFFER_LEN: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("Invalid bind address {host}:{port}: {reason}")]
    InvalidBindAddress {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Failed to bind telemetry socket: {0}")]
    Bind(#[source] std::io::Error),
}

/// Counters plus the latest accepted record
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverStats<R> {
    /// Datagrams that decoded and were published
    pub packets_received: u64,
    /// Wrong size or unparsable content
    pub malformed: u64,
    /// Right size, wrong checksum
    pub crc_errors: u64,
    /// Estimated from sequence gaps; never decremented
    pub packets_lost: u64,
    /// `None` until a record carrying a sequence number arrives
    pub last_sequence: Option<u32>,
    /// Last known good record; a rejected datagram never replaces it
    pub last_record: Option<R>,
    /// Arrival time of `last_record`
    pub last_packet_at: Option<DateTime<Local>>,
}

impl<R> Default for ReceiverStats<R> {
    fn default() -> Self {
        Self {
            packets_received: 0,
            malformed: 0,
            crc_errors: 0,
            packets_lost: 0,
            last_sequence: None,
            last_record: None,
            last_packet_at: None,
        }
    }
}

/// Number of packets missing between the last accepted sequence and `seq`.
///
/// A jump back to zero is a sender restart, and any sequence at or behind
/// the expected one (duplicate, reordering, wraparound) counts as no loss.
pub fn missed_between(last: u32, seq: u32) -> u64 {
    let expected = last.wrapping_add(1);
    if seq == expected || seq == 0 || seq < expected {
        0
    } else {
        (seq - expected) as u64
    }
}

/// Socket-independent packet handling shared with the receive task
pub struct ReceiverCore<F: TelemetryFormat> {
    format: F,
    store: Arc<dyn TelemetryStore>,
    stats: Mutex<ReceiverStats<F::Record>>,
}

impl<F: TelemetryFormat> ReceiverCore<F> {
    pub fn new(format: F, store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            format,
            store,
            stats: Mutex::new(ReceiverStats::default()),
        }
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn stats(&self) -> ReceiverStats<F::Record> {
        lock(&self.stats).clone()
    }

    /// Validates one datagram and, if accepted, publishes it.
    ///
    /// Returns how many packets were detected as lost right before it.
    pub fn ingest(&self, datagram: &[u8]) -> Result<u64, PacketError> {
        let record = match self.format.decode(datagram) {
            Ok(record) => record,
            Err(e) => {
                let mut stats = lock(&self.stats);
                match e {
                    PacketError::CrcMismatch { .. } => stats.crc_errors += 1,
                    PacketError::WrongSize { .. } | PacketError::Malformed(_) => {
                        stats.malformed += 1
                    }
                }
                return Err(e);
            }
        };

        let lost = {
            let mut stats = lock(&self.stats);
            stats.packets_received += 1;
            let mut lost = 0;
            if let Some(seq) = self.format.sequence(&record) {
                if let Some(last) = stats.last_sequence {
                    lost = missed_between(last, seq);
                    stats.packets_lost += lost;
                }
                stats.last_sequence = Some(seq);
            }
            stats.last_record = Some(record.clone());
            stats.last_packet_at = Some(Local::now());
            lost
        };

        self.format.publish(&record, self.store.as_ref());
        Ok(lost)
    }
}

/// Background UDP listener for one telemetry format
pub struct TelemetryReceiver<F: TelemetryFormat> {
    bind: SocketAddr,
    recv_timeout: Duration,
    core: Arc<ReceiverCore<F>>,
    local_addr: Mutex<Option<SocketAddr>>,
    worker: WorkerSlot,
}

impl<F: TelemetryFormat> TelemetryReceiver<F> {
    /// Resolves the bind address; nothing is opened until `start()`.
    ///
    /// Port 0 picks an ephemeral port, see [`Self::local_addr`].
    pub fn new(
        format: F,
        host: &str,
        port: u16,
        recv_timeout: Duration,
        store: Arc<dyn TelemetryStore>,
    ) -> Result<Self, ReceiverError> {
        let invalid = |reason: String| ReceiverError::InvalidBindAddress {
            host: host.to_string(),
            port,
            reason,
        };
        if recv_timeout.is_zero() {
            return Err(invalid("receive timeout must be non-zero".to_string()));
        }
        let bind = (host, port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host resolved to no address".to_string()))?;

        info!("Created {} receiver for {}", format.name(), bind);
        Ok(Self {
            bind,
            recv_timeout,
            core: Arc::new(ReceiverCore::new(format, store)),
            local_addr: Mutex::new(None),
            worker: WorkerSlot::new(),
        })
    }

    /// Name of the format, used in every log line of this receiver
    pub fn name(&self) -> &'static str {
        self.core.format().name()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Address the socket is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    /// Copy of the counters and the last accepted record
    pub fn get_stats(&self) -> ReceiverStats<F::Record> {
        self.core.stats()
    }

    /// Binds the socket and spawns the receive task. Does nothing if running.
    pub async fn start(&self) -> Result<(), ReceiverError> {
        if self.is_running() {
            debug!("{} receiver already running", self.name());
            return Ok(());
        }

        let socket = UdpSocket::bind(self.bind)
            .await
            .map_err(ReceiverError::Bind)?;
        let local = socket.local_addr().map_err(ReceiverError::Bind)?;

        let core = self.core.clone();
        let recv_timeout = self.recv_timeout;
        if self
            .worker
            .install(move |token| run_receive_loop(socket, core, recv_timeout, token))
        {
            *lock(&self.local_addr) = Some(local);
            info!("{} receiver listening on {}", self.name(), local);
        }
        Ok(())
    }

    /// Stops the receive task and releases the socket. Safe to repeat.
    pub async fn stop(&self) {
        if self.worker.stop(self.name(), STOP_TIMEOUT).await {
            *lock(&self.local_addr) = None;
            info!("{} receiver stopped", self.name());
        }
    }
}

async fn run_receive_loop<F: TelemetryFormat>(
    socket: UdpSocket,
    core: Arc<ReceiverCore<F>>,
    recv_timeout: Duration,
    token: CancellationToken,
) {
    let name = core.format().name();
    let mut buf = [0u8; RECV_BUFFER_LEN];
    let mut last_log = Instant::now();

    loop {
        let received = tokio::select! {
            _ = token.cancelled() => break,
            r = tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)) => r,
        };

        match received {
            // Quiet link; just gives the stats log below a chance to run
            Err(_elapsed) => {}
            Ok(Ok((len, peer))) => match core.ingest(&buf[..len]) {
                Ok(0) => {}
                Ok(lost) => warn!("{}: packet loss detected, {} packets lost", name, lost),
                Err(e) => warn!("{}: dropped datagram from {}: {}", name, peer, e),
            },
            Ok(Err(e)) => {
                warn!("{} receive error: {}", name, e);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }

        if last_log.elapsed() >= STATS_INTERVAL {
            let stats = core.stats();
            info!(
                "{} receiver: {} received, {} CRC errors, {} malformed, {} lost, last seq {:?}",
                name,
                stats.packets_received,
                stats.crc_errors,
                stats.malformed,
                stats.packets_lost,
                stats.last_sequence
            );
            last_log = Instant::now();
        }
    }

    debug!("{} receive loop exiting", name);
}
