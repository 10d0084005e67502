//! Controller Input Processor
//!
//! One [`InputProcessor::tick`] per poll period:
//!
//! - **Disconnected**: every `reconnect_interval` try to attach a device. On
//!   success read one calibration sample, capture stick offsets, go Active.
//! - **Active**: read the device, shape the sticks, map them onto command
//!   fields, rate limit, push to the sink. A failed read drops back to
//!   Disconnected and pushes a neutral command (light kept).
//!
//! Mapping (with the shift button released / held):
//!
//! ```text
//! left stick  -Y → surge   / pitch
//! left stick   X → sway    / roll
//! right stick -Y → heave
//! right stick  X → yaw
//! RT - LT        → manipulator
//! light up/down  → light ± light_step on the press edge
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::backend::{InputBackend, RawInput};
use super::link::{Active, Disconnected, InputLink};
use super::shaping::{EdgeDetector, RateLimiter, Shaping};
use crate::command::{CommandSink, Field};
use crate::config::ControllerConfig;
use crate::worker::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Active { device: String },
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Disconnected => write!(f, "disconnected"),
            LinkStatus::Active { device } => write!(f, "active ({})", device),
        }
    }
}

enum Link {
    Disconnected(InputLink<Disconnected>),
    Active(InputLink<Active>),
}

/// Maps one input device onto a [`CommandSink`], one [`tick`](Self::tick) per poll.
///
/// While no device is linked the sink is held at neutral and a reconnect is
/// attempted every `reconnect_interval_ms`.
pub struct InputProcessor<B: InputBackend, S: CommandSink> {
    backend: B,
    sink: Arc<S>,
    config: ControllerConfig,
    shaping: Shaping,
    link: Link,
    limiter: RateLimiter,
    light_up: EdgeDetector,
    light_down: EdgeDetector,
    /// Normalized light level in [0, 1]
    light: f32,
    next_attempt: Option<Instant>,
    status: Arc<Mutex<LinkStatus>>,
}

impl<B: InputBackend, S: CommandSink> InputProcessor<B, S> {
    pub fn new(backend: B, sink: Arc<S>, config: ControllerConfig) -> Self {
        let shaping = Shaping {
            shape: config.deadzone_shape,
            deadzone: config.deadzone,
            anti_deadzone: config.anti_deadzone,
            expo: config.expo,
        };
        debug!("Creating input processor with {:?}", shaping);
        Self {
            backend,
            sink,
            link: Link::Disconnected(InputLink::create(config.stuck_threshold)),
            limiter: RateLimiter::new(config.max_step),
            shaping,
            config,
            light_up: EdgeDetector::default(),
            light_down: EdgeDetector::default(),
            light: 0.0,
            next_attempt: None,
            status: Arc::new(Mutex::new(LinkStatus::Disconnected)),
        }
    }

    /// Shared view of the link state for other threads
    pub fn status_handle(&self) -> Arc<Mutex<LinkStatus>> {
        self.status.clone()
    }

    /// Current link state
    pub fn status(&self) -> LinkStatus {
        lock(&self.status).clone()
    }

    /// Light level in [0, 1], stepped by the light buttons
    pub fn light(&self) -> f32 {
        self.light
    }

    /// Runs one poll: reconnect, calibrate or read, shape and write to the sink
    pub fn tick(&mut self, now: Instant) {
        let placeholder = Link::Disconnected(InputLink::create(self.config.stuck_threshold));
        self.link = match std::mem::replace(&mut self.link, placeholder) {
            Link::Disconnected(idle) => self.try_connect(idle, now),
            Link::Active(active) => match self.backend.read() {
                Ok(input) => {
                    self.apply(&active, &input);
                    Link::Active(active)
                }
                Err(e) => {
                    warn!("Controller lost: {}", e);
                    self.send_neutral();
                    self.next_attempt = Some(now + self.config.reconnect_interval());
                    self.set_status(LinkStatus::Disconnected);
                    Link::Disconnected(active.detach())
                }
            },
        };
    }

    fn try_connect(&mut self, idle: InputLink<Disconnected>, now: Instant) -> Link {
        if self.next_attempt.is_some_and(|at| now < at) {
            return Link::Disconnected(idle);
        }
        self.next_attempt = Some(now + self.config.reconnect_interval());

        let Some(name) = self.backend.connect() else {
            debug!("No controller available, retrying in {:?}", self.config.reconnect_interval());
            return Link::Disconnected(idle);
        };

        let calibrating = idle.attach(name);
        match self.backend.read() {
            Ok(sample) => {
                let active = calibrating.calibrate(&sample, &self.config.axes.sticks());
                self.limiter.reset();
                // a button held while plugging in is not a press
                self.light_up.prime(sample.button(self.config.buttons.light_up));
                self.light_down
                    .prime(sample.button(self.config.buttons.light_down));
                let device = active.device().unwrap_or_default().to_string();
                self.set_status(LinkStatus::Active { device });
                Link::Active(active)
            }
            Err(e) => {
                warn!("Calibration read failed: {}", e);
                Link::Disconnected(calibrating.abort())
            }
        }
    }

    fn apply(&mut self, link: &InputLink<Active>, input: &RawInput) {
        let axes = &self.config.axes;
        let buttons = &self.config.buttons;

        let (lx, ly) = self.shaping.stick(
            link.calibrated(input, axes.left_x),
            link.calibrated(input, axes.left_y),
        );
        let (rx, ry) = self.shaping.stick(
            link.calibrated(input, axes.right_x),
            link.calibrated(input, axes.right_y),
        );

        // triggers rest at -1; bring both to [0, 1]
        let trigger = |index: usize| (input.axis(index).clamp(-1.0, 1.0) + 1.0) / 2.0;
        let manipulator = trigger(axes.right_trigger) - trigger(axes.left_trigger);

        let (surge, sway, pitch, roll) = if input.button(buttons.shift) {
            (0.0, 0.0, -ly, lx)
        } else {
            (-ly, lx, 0.0, 0.0)
        };

        if self.light_up.rising(input.button(buttons.light_up)) {
            self.light = (self.light + self.config.light_step).min(1.0);
            info!("Light up: {:.0}%", self.light * 100.0);
        }
        if self.light_down.rising(input.button(buttons.light_down)) {
            self.light = (self.light - self.config.light_step).max(0.0);
            info!("Light down: {:.0}%", self.light * 100.0);
        }

        let mut values: Vec<(Field, i32)> = [
            (Field::Surge, surge),
            (Field::Sway, sway),
            (Field::Heave, -ry),
            (Field::Roll, roll),
            (Field::Pitch, pitch),
            (Field::Yaw, rx),
            (Field::Manipulator, manipulator),
        ]
        .into_iter()
        .map(|(field, value)| (field, self.limiter.limit(field, field.scale_normalized(value))))
        .collect();
        values.push((Field::Light, Field::Light.scale_normalized(self.light)));

        debug!("Controller output: {:?}", values);
        self.sink.set_command(&values);
    }

    fn send_neutral(&mut self) {
        let neutral: Vec<(Field, i32)> = Field::ALL
            .into_iter()
            .filter(|&field| field != Field::Light)
            .map(|field| (field, 0))
            .collect();
        self.sink.set_command(&neutral);
        self.limiter.reset();
        info!("Neutral command issued, light kept at {:.0}%", self.light * 100.0);
    }

    fn set_status(&self, status: LinkStatus) {
        *lock(&self.status) = status;
    }
}
