//! Lifecycle slot for one cancellable background task.
//!
//! Every network loop in the station (command sender, telemetry receivers,
//! record forwarder) is a tokio task paired with a [`CancellationToken`].
//! The slot makes `start` idempotent and `stop` safe to call repeatedly, and
//! bounds how long a stop waits for the task to wind down.
//!
//! Also home to the two helpers every loop shares: [`lock`] for mutexes that
//! must stay usable after a panicking holder, and [`period_from_rate`] for
//! turning a configured rate into a tick period.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct WorkerSlot {
    inner: Mutex<Option<Worker>>,
}

/// Locks `mutex`, taking the guard back from a poisoned lock.
///
/// Shared state in the station is plain data (commands, counters, the last
/// record), so a panic in another holder never leaves it half-updated in a
/// way later readers could not use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Tick period for a loop running at `rate_hz`.
///
/// Returns `None` when the rate is not a positive finite number, or when
/// the period does not fit a [`Duration`] (rates so small that `1 / rate`
/// overflows) or rounds down to zero (rates so large the loop would spin).
///
/// # Examples
///
/// ```rust
/// use rovlink::worker::period_from_rate;
/// use std::time::Duration;
///
/// assert_eq!(period_from_rate(20.0), Some(Duration::from_millis(50)));
/// assert_eq!(period_from_rate(0.0), None);
/// assert_eq!(period_from_rate(1e-20), None);
/// ```
pub fn period_from_rate(rate_hz: f64) -> Option<Duration> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(rate_hz.recip())
        .ok()
        .filter(|period| !period.is_zero())
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner)
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Spawns the task built by `make` unless one is already running.
    ///
    /// Returns `false` (and never calls `make`) when a live task exists.
    /// Must be called from within a tokio runtime.
    pub fn install<F, Fut>(&self, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.inner);
        if slot
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
        {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(make(token.clone()));
        *slot = Some(Worker { token, handle });
        true
    }

    /// Cancels the task and waits at most `timeout` for it to finish.
    ///
    /// Returns `true` if a task was running when the stop was requested.
    pub async fn stop(&self, name: &str, timeout: Duration) -> bool {
        let worker = lock(&self.inner).take();
        let Some(Worker { token, handle }) = worker else {
            debug!("{} stop requested while not running", name);
            return false;
        };

        token.cancel();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => debug!("{} task joined", name),
            Ok(Err(e)) => error!("{} task ended abnormally: {}", name, e),
            Err(_) => warn!(
                "{} task did not finish within {:?}, detaching it",
                name, timeout
            ),
        }
        true
    }
}
