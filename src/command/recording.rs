//! Socket-less [`CommandSink`] that remembers recent updates.
//!
//! Used for dry runs of the station and for exercising the controller
//! pipeline without a network. The history is a ring of the most recent
//! command states, so a dry run driven by the controller for hours keeps a
//! fixed footprint; the total number of updates is counted separately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::info;

use super::model::{Command, Field};
use super::{ChannelError, CommandSink, CommandSnapshot};
use crate::worker::lock;

/// History kept by [`RecordingSink::new`]: about 17 s of controller output at 60 Hz
pub const DEFAULT_HISTORY_LEN: usize = 1024;

#[derive(Debug)]
struct Recorded {
    current: Command,
    history: VecDeque<Command>,
    updates: u64,
}

#[derive(Debug)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
    capacity: usize,
    running: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_LEN)
    }
}

impl RecordingSink {
    /// Sink keeping the last [`DEFAULT_HISTORY_LEN`] states
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink keeping at most `capacity` past states (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recorded: Mutex::new(Recorded {
                current: Command::default(),
                history: VecDeque::with_capacity(capacity),
                updates: 0,
            }),
            capacity,
            running: AtomicBool::new(false),
        }
    }

    /// The most recent command states produced by setter calls, oldest first
    pub fn history(&self) -> Vec<Command> {
        lock(&self.recorded).history.iter().copied().collect()
    }

    /// Current command state
    pub fn last(&self) -> Command {
        lock(&self.recorded).current
    }

    /// Setter calls since creation, including those dropped from the history
    pub fn updates(&self) -> u64 {
        lock(&self.recorded).updates
    }

    /// Between `start()` and `stop()`; setters record either way
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn record(&self, apply: impl FnOnce(&mut Command)) {
        let mut recorded = lock(&self.recorded);
        apply(&mut recorded.current);
        let state = recorded.current;
        if recorded.history.len() == self.capacity {
            recorded.history.pop_front();
        }
        recorded.history.push_back(state);
        recorded.updates += 1;
    }
}

impl CommandSink for RecordingSink {
    async fn start(&self) -> Result<(), ChannelError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Recording sink started");
        }
        Ok(())
    }

    async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Recording sink stopped after {} updates", self.updates());
        }
    }

    fn set_command(&self, values: &[(Field, i32)]) {
        self.record(|command| {
            for &(field, value) in values {
                command.set(field, value);
            }
        });
    }

    fn set_from_axes(&self, axes: &[(Field, f32)]) {
        self.record(|command| command.set_from_normalized(axes));
    }

    fn get_command(&self) -> CommandSnapshot {
        let recorded = lock(&self.recorded);
        CommandSnapshot {
            command: recorded.current,
            sequence: recorded.updates as u32,
            packets_sent: 0,
            send_errors: 0,
        }
    }
}
