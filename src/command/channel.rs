//! Command Channel - fixed-rate UDP command sender
//!
//! Owns one [`Command`] and a sequence counter behind a single mutex shared
//! by every writer (controller thread, command API) and the one send task.
//! Each tick the task encodes the command under the lock, assigns and
//! advances the sequence number, releases the lock and transmits.
//!
//! The link is unacknowledged: send failures are logged and counted and the
//! loop carries on with the next tick.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{build_packet, Command, Field};
use super::{CommandSink, CommandSnapshot};
use crate::config::CommandConfig;
use crate::worker::{lock, period_from_rate, WorkerSlot};

/// Upper bound on how long `stop()` waits for the send task
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// How often the send loop reports its counters
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Errors raised while constructing or starting a channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid send rate: {0} Hz (must be finite and > 0)")]
    InvalidRate(f64),

    #[error("Invalid destination {host}:{port}: {reason}")]
    InvalidDestination {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Failed to open command socket: {0}")]
    Bind(#[source] std::io::Error),
}

#[derive(Debug, Default)]
struct SenderState {
    command: Command,
    sequence: u32,
    packets_sent: u64,
    send_errors: u64,
}

impl SenderState {
    fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            command: self.command,
            sequence: self.sequence,
            packets_sent: self.packets_sent,
            send_errors: self.send_errors,
        }
    }
}

/// Fixed-rate sender of command packets to the vehicle
pub struct CommandChannel {
    destination: SocketAddr,
    period: Duration,
    state: Arc<Mutex<SenderState>>,
    worker: WorkerSlot,
}

impl CommandChannel {
    /// Creates a channel sending to `host:port` at `rate_hz`.
    ///
    /// Nothing is opened or spawned here; the socket is bound and the send
    /// task started by [`CommandSink::start`]. The destination is resolved
    /// once, so a host name that later changes address is not followed.
    ///
    /// # Errors
    ///
    /// * [`ChannelError::InvalidRate`] - `rate_hz` is not positive and finite,
    ///   or so small its period does not fit a [`Duration`]
    /// * [`ChannelError::InvalidDestination`] - port 0 or an unresolvable host
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use rovlink::command::CommandChannel;
    ///
    /// let channel = CommandChannel::new("127.0.0.1", 9000, 20.0).unwrap();
    /// assert_eq!(channel.period(), Duration::from_millis(50));
    ///
    /// assert!(CommandChannel::new("127.0.0.1", 9000, 0.0).is_err());
    /// assert!(CommandChannel::new("127.0.0.1", 0, 20.0).is_err());
    /// ```
    pub fn new(host: &str, port: u16, rate_hz: f64) -> Result<Self, ChannelError> {
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

        info!(
            "Created command channel to {} at {} Hz (period {:?})",
            destination, rate_hz, period
        );

        Ok(Self {
            destination,
            period,
            state: Arc::new(Mutex::new(SenderState::default())),
            worker: WorkerSlot::new(),
        })
    }

    /// Creates a channel from the `[command]` config section.
    ///
    /// Equivalent to [`CommandChannel::new`] with the section's host, port
    /// and rate; `dry_run` is not looked at, the caller decides whether a
    /// real channel is wanted at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use rovlink::command::CommandChannel;
    /// use rovlink::config::CommandConfig;
    ///
    /// let config = CommandConfig {
    ///     host: "127.0.0.1".to_string(),
    ///     port: 9000,
    ///     ..CommandConfig::default()
    /// };
    /// let channel = CommandChannel::from_config(&config).unwrap();
    /// assert_eq!(channel.destination().port(), 9000);
    /// ```
    pub fn from_config(config: &CommandConfig) -> Result<Self, ChannelError> {
        Self::new(&config.host, config.port, config.rate_hz)
    }

    /// Resolved address every packet is sent to
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Time between two packets, the inverse of the configured rate
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the send task is alive.
    ///
    /// `false` before [`CommandSink::start`], after [`CommandSink::stop`], and
    /// if the task ended on its own.
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl CommandSink for CommandChannel {
    async fn start(&self) -> Result<(), ChannelError> {
        if self.is_running() {
            debug!("Command channel already running");
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

        let destination = self.destination;
        let period = self.period;
        let state = self.state.clone();
        let started = self.worker.install(move |token| {
            run_send_loop(socket, destination, period, state, token)
        });

        if started {
            info!("Command channel started towards {}", self.destination);
        } else {
            debug!("Command channel was started concurrently, keeping the running task");
        }
        Ok(())
    }

    async fn stop(&self) {
        if self.worker.stop("Command channel", STOP_TIMEOUT).await {
            info!("Command channel stopped");
        }
    }

    fn set_command(&self, values: &[(Field, i32)]) {
        let mut state = lock(&self.state);
        for &(field, value) in values {
            state.command.set(field, value);
        }
    }

    fn set_from_axes(&self, axes: &[(Field, f32)]) {
        lock(&self.state).command.set_from_normalized(axes);
    }

    fn get_command(&self) -> CommandSnapshot {
        lock(&self.state).snapshot()
    }
}

async fn run_send_loop(
    socket: UdpSocket,
    destination: SocketAddr,
    period: Duration,
    state: Arc<Mutex<SenderState>>,
    token: CancellationToken,
) {
    info!("Command send loop running, period {:?}", period);

    let mut failing = false;
    let mut sent_since_log = 0u64;
    let mut last_log = Instant::now();

    while !token.is_cancelled() {
        let tick_start = Instant::now();

        let (sequence, packet) = {
            let mut state = lock(&state);
            let sequence = state.sequence;
            let packet = build_packet(sequence, &state.command.encode());
            state.sequence = state.sequence.wrapping_add(1);
            (sequence, packet)
        };

        match socket.send_to(&packet, destination).await {
            Ok(_) => {
                lock(&state).packets_sent += 1;
                sent_since_log += 1;
                if failing {
                    info!("Command link recovered at sequence {}", sequence);
                    failing = false;
                }
            }
            Err(e) => {
                lock(&state).send_errors += 1;
                if failing {
                    debug!("Command send {} failed: {}", sequence, e);
                } else {
                    warn!("Command send {} to {} failed: {}", sequence, destination, e);
                    failing = true;
                }
            }
        }

        if last_log.elapsed() >= STATS_INTERVAL {
            let snapshot = lock(&state).snapshot();
            info!(
                "Command channel: {} packets in last {}s, {} total, {} send errors",
                sent_since_log,
                last_log.elapsed().as_secs(),
                snapshot.packets_sent,
                snapshot.send_errors
            );
            sent_since_log = 0;
            last_log = Instant::now();
        }

        let sleep_for = period.saturating_sub(tick_start.elapsed());
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    info!("Command send loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_rate() {
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY, 1e-20, 1e300] {
            assert!(matches!(
                CommandChannel::new("127.0.0.1", 9000, rate),
                Err(ChannelError::InvalidRate(_))
            ));
        }
    }

    #[test]
    fn test_rejects_invalid_destination() {
        assert!(matches!(
            CommandChannel::new("not a host name", 9000, 20.0),
            Err(ChannelError::InvalidDestination { .. })
        ));
        assert!(matches!(
            CommandChannel::new("127.0.0.1", 0, 20.0),
            Err(ChannelError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn test_period_from_rate() {
        let channel = CommandChannel::new("127.0.0.1", 9000, 20.0).unwrap();
        assert_eq!(channel.period(), Duration::from_millis(50));
        assert!(!channel.is_running());
    }

    #[test]
    fn test_setters_saturate_and_snapshot() {
        let channel = CommandChannel::new("127.0.0.1", 9000, 20.0).unwrap();
        channel.set_command(&[(Field::Yaw, -400), (Field::Light, 30)]);
        channel.set_from_axes(&[(Field::Surge, 1.0)]);

        let snapshot = channel.get_command();
        assert_eq!(snapshot.command.yaw, -128);
        assert_eq!(snapshot.command.light, 30);
        assert_eq!(snapshot.command.surge, 127);
        assert_eq!(snapshot.sequence, 0);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_harmless() {
        let channel = CommandChannel::new("127.0.0.1", 9000, 20.0).unwrap();
        channel.stop().await;
        channel.stop().await;
        assert!(!channel.is_running());
    }
}
