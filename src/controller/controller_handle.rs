//! Controller Handle - owns the polling thread
//!
//! The input backend is created inside the thread because gilrs is not
//! `Send`. Initialization failures are reported back before `spawn`
//! returns, so the caller can continue without a controller.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::{DeviceError, GilrsBackend, InputBackend};
use super::processor::{InputProcessor, LinkStatus};
use crate::command::CommandSink;
use crate::config::{ConfigError, ControllerConfig};
use crate::worker::lock;

const STATS_INTERVAL: Duration = Duration::from_secs(30);
const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Failed to spawn controller thread: {0}")]
    Spawn(String),

    #[error("Invalid controller config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] DeviceError),
}

/// Owner of the controller polling thread.
///
/// Dropping the handle cancels the poll loop without waiting for it; use
/// [`ControllerHandle::stop`] for an orderly shutdown.
pub struct ControllerHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
    status: Arc<Mutex<LinkStatus>>,
}

impl ControllerHandle {
    /// Starts polling with a backend built by `make_backend` on the new thread.
    ///
    /// The config is validated before any thread exists, so a bad poll rate
    /// or tuning value comes back as [`ControllerError::Config`].
    pub fn spawn<B, S, F>(
        config: ControllerConfig,
        sink: Arc<S>,
        make_backend: F,
    ) -> Result<Self, ControllerError>
    where
        B: InputBackend + 'static,
        S: CommandSink,
        F: FnOnce() -> Result<B, DeviceError> + Send + 'static,
    {
        config.validate()?;
        let period = config.poll_period()?;

        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Mutex<LinkStatus>>, DeviceError>>();
        let thread_token = token.clone();

        let thread = std::thread::Builder::new()
            .name("controller".to_string())
            .spawn(move || {
                let backend = match make_backend() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let processor = InputProcessor::new(backend, sink, config);
                if ready_tx.send(Ok(processor.status_handle())).is_err() {
                    return;
                }
                run_poll_loop(processor, period, thread_token);
            })
            .map_err(|e| ControllerError::Spawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(status)) => {
                info!("Controller thread started ({:?} poll period)", period);
                Ok(Self {
                    token,
                    thread: Some(thread),
                    status,
                })
            }
            Ok(Err(e)) => {
                error!("Controller backend failed: {}", e);
                let _ = thread.join();
                Err(ControllerError::Backend(e))
            }
            Err(_) => {
                let _ = thread.join();
                Err(ControllerError::Spawn(
                    "controller thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Spawns with the gilrs game controller backend
    pub fn spawn_gilrs<S: CommandSink>(
        config: ControllerConfig,
        sink: Arc<S>,
    ) -> Result<Self, ControllerError> {
        Self::spawn(config, sink, GilrsBackend::new)
    }

    /// Current device link state as last set by the poll loop
    pub fn status(&self) -> LinkStatus {
        lock(&self.status).clone()
    }

    /// Whether the polling thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Cancels the poll loop and waits up to `timeout` for the thread to exit
    pub async fn stop(&mut self, timeout: Duration) {
        self.token.cancel();
        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !thread.is_finished() && Instant::now() < deadline {
            tokio::time::sleep(STOP_POLL).await;
        }

        if thread.is_finished() {
            if thread.join().is_err() {
                error!("Controller thread panicked");
            } else {
                info!("Controller stopped");
            }
        } else {
            warn!("Controller thread did not stop within {:?}, detaching", timeout);
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn run_poll_loop<B: InputBackend, S: CommandSink>(
    mut processor: InputProcessor<B, S>,
    period: Duration,
    token: CancellationToken,
) {
    debug!("Controller poll loop running");
    let mut ticks: u64 = 0;
    let mut last_stats = Instant::now();

    while !token.is_cancelled() {
        let started = Instant::now();
        processor.tick(started);
        ticks += 1;

        if last_stats.elapsed() >= STATS_INTERVAL {
            info!(
                "Controller: {} ticks, link {}, light {:.0}%",
                ticks,
                processor.status(),
                processor.light() * 100.0
            );
            last_stats = Instant::now();
        }

        std::thread::sleep(period.saturating_sub(started.elapsed()));
    }
    debug!("Controller poll loop exited after {} ticks", ticks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RecordingSink;
    use crate::controller::processor::tests::{frame, MockBackend, Script};

    #[test]
    fn test_backend_failure_is_reported() {
        let sink = Arc::new(RecordingSink::new());
        let result = ControllerHandle::spawn(ControllerConfig::default(), sink, || {
            Err::<MockBackend, _>(DeviceError::Init("no hid".to_string()))
        });
        assert!(matches!(
            result,
            Err(ControllerError::Backend(DeviceError::Init(_)))
        ));
    }

    #[test]
    fn test_invalid_poll_rate_fails_before_spawning() {
        for poll_rate_hz in [0.0, -60.0, 1e-20] {
            let config = ControllerConfig {
                poll_rate_hz,
                ..ControllerConfig::default()
            };
            let built = Arc::new(Mutex::new(false));
            let flag = built.clone();
            let result = ControllerHandle::spawn(config, Arc::new(RecordingSink::new()), move || {
                *lock(&flag) = true;
                Ok(MockBackend(Arc::new(Mutex::new(Script::default()))))
            });
            assert!(
                matches!(result, Err(ControllerError::Config(_))),
                "poll rate {}",
                poll_rate_hz
            );
            assert!(!*lock(&built));
        }
    }

    #[test]
    fn test_invalid_tuning_is_rejected() {
        let config = ControllerConfig {
            deadzone: 1.5,
            ..ControllerConfig::default()
        };
        let result = ControllerHandle::spawn(config, Arc::new(RecordingSink::new()), || {
            Ok(MockBackend(Arc::new(Mutex::new(Script::default()))))
        });
        assert!(matches!(result, Err(ControllerError::Config(_))));
    }

    #[tokio::test]
    async fn test_polls_until_stopped() {
        let script = Arc::new(Mutex::new(Script::default()));
        {
            let mut script = lock(&script);
            script.devices.push_back("pad");
            // calibration sample at rest
            script
                .frames
                .push_back(Ok(frame([0.0, 0.0, 0.0, 0.0, -1.0, -1.0], &[])));
            for _ in 0..500 {
                script
                    .frames
                    .push_back(Ok(frame([0.0, -1.0, 0.0, 0.0, -1.0, -1.0], &[])));
            }
        }
        let sink = Arc::new(RecordingSink::new());
        let backend_script = script.clone();
        let mut handle = ControllerHandle::spawn(ControllerConfig::default(), sink.clone(), move || {
            Ok(MockBackend(backend_script))
        })
        .expect("spawn");

        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            handle.status(),
            LinkStatus::Active {
                device: "pad".to_string()
            }
        );
        assert!(sink.last().surge > 0);

        handle.stop(Duration::from_secs(1)).await;
        assert!(!handle.is_running());

        let updates = sink.updates();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.updates(), updates);
    }
}
