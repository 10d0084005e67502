//! Controller subsystem: game controller → command fields
//!
//! 1. [`backend`] - Device access, normalized to indexed axes and buttons
//! 2. [`link`] - Connection typestate with per-connection stick calibration
//! 3. [`shaping`] - Deadzones, expo, rate limiting, button edges
//! 4. [`processor`] - Per-tick mapping of shaped input onto a [`CommandSink`]
//! 5. [`controller_handle`] - Polling thread and lifecycle
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Backend ──► InputLink ──► Shaping ──► CommandSink
//!            (RawInput)  (calibrated)  (limited)
//! ```
//!
//! Polling runs on its own thread at `poll_rate_hz`; a lost device is
//! retried every `reconnect_interval_ms` while the sink holds neutral.
//!
//! [`CommandSink`]: crate::command::CommandSink

pub mod backend;
pub mod controller_handle;
pub mod link;
pub mod processor;
pub mod shaping;

pub use backend::{DeviceError, GilrsBackend, InputBackend, RawInput};
pub use controller_handle::{ControllerError, ControllerHandle};
pub use processor::{InputProcessor, LinkStatus};
pub use shaping::{DeadzoneShape, Shaping};
