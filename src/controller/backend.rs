//! Input device backends
//!
//! The processor only sees [`RawInput`]: indexed axes in `[-1, 1]` and
//! indexed buttons. Which physical control sits at which index is decided
//! here, and the processor picks indices from configuration.
//!
//! Index table of [`GilrsBackend`]:
//!
//! | axis | control                          |
//! |------|----------------------------------|
//! | 0    | left stick X (right = +)         |
//! | 1    | left stick Y (down = +)          |
//! | 2    | right stick X (right = +)        |
//! | 3    | right stick Y (down = +)         |
//! | 4    | left trigger (released = -1)     |
//! | 5    | right trigger (released = -1)    |
//!
//! | button | control        | button | control     |
//! |--------|----------------|--------|-------------|
//! | 0      | South (A)      | 8      | Mode        |
//! | 1      | East (B)       | 9      | Left stick  |
//! | 2      | West (X)       | 10     | Right stick |
//! | 3      | North (Y)      | 11     | D-pad up    |
//! | 4      | Left bumper    | 12     | D-pad down  |
//! | 5      | Right bumper   | 13     | D-pad left  |
//! | 6      | Select / View  | 14     | D-pad right |
//! | 7      | Start / Menu   |        |             |
//!
//! Stick Y axes follow the common HID convention (pushed forward reads
//! negative), so the processor inverts them for surge/heave.

use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to initialize input backend: {0}")]
    Init(String),

    #[error("Input device disconnected: {0}")]
    Disconnected(String),

    #[error("No input device connected")]
    NoDevice,
}

/// One poll of the device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInput {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
}

impl RawInput {
    /// Axis value, 0.0 for indices the device does not have
    pub fn axis(&self, index: usize) -> f32 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    /// Button state, released for indices the device does not have
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }
}

/// Source of raw controller state, polled from one thread
pub trait InputBackend {
    /// Tries to attach to a device, returning its name on success
    fn connect(&mut self) -> Option<String>;

    /// Reads the current state of the attached device
    fn read(&mut self) -> Result<RawInput, DeviceError>;
}

const BUTTONS: [Button; 15] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

/// Game controller access through gilrs. Must stay on the thread that created it.
pub struct GilrsBackend {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GilrsBackend {
    /// Initializes gilrs; fails with [`DeviceError::Init`] when no input
    /// subsystem is available
    pub fn new() -> Result<Self, DeviceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            DeviceError::Init(e.to_string())
        })?;
        Ok(Self {
            gilrs,
            active: None,
        })
    }

    /// Drains pending events so gilrs' cached state is current.
    ///
    /// Returns true if the active gamepad reported a disconnect.
    fn pump(&mut self) -> bool {
        let mut lost = false;
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Disconnected if Some(id) == self.active => lost = true,
                EventType::Connected => debug!("Gamepad {} connected", id),
                _ => {}
            }
        }
        lost
    }

    fn trigger(gamepad: &Gamepad<'_>, button: Button, axis: Axis) -> f32 {
        let pressed = gamepad
            .button_data(button)
            .map(|data| data.value())
            .unwrap_or_else(|| gamepad.value(axis).max(0.0));
        pressed.clamp(0.0, 1.0) * 2.0 - 1.0
    }
}

impl InputBackend for GilrsBackend {
    fn connect(&mut self) -> Option<String> {
        self.pump();
        let (id, name) = self
            .gilrs
            .gamepads()
            .find(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))?;
        info!("Selected gamepad {} ({})", name, id);
        self.active = Some(id);
        Some(name)
    }

    fn read(&mut self) -> Result<RawInput, DeviceError> {
        let id = self.active.ok_or(DeviceError::NoDevice)?;
        if self.pump() {
            self.active = None;
            warn!("Gamepad {} disconnected", id);
            return Err(DeviceError::Disconnected(id.to_string()));
        }
        let Some(gamepad) = self.gilrs.connected_gamepad(id) else {
            self.active = None;
            return Err(DeviceError::Disconnected(id.to_string()));
        };

        let axes = vec![
            gamepad.value(Axis::LeftStickX),
            -gamepad.value(Axis::LeftStickY),
            gamepad.value(Axis::RightStickX),
            -gamepad.value(Axis::RightStickY),
            Self::trigger(&gamepad, Button::LeftTrigger2, Axis::LeftZ),
            Self::trigger(&gamepad, Button::RightTrigger2, Axis::RightZ),
        ];
        let buttons = BUTTONS
            .iter()
            .map(|&button| gamepad.is_pressed(button))
            .collect();

        Ok(RawInput { axes, buttons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_indices_read_neutral() {
        let input = RawInput {
            axes: vec![0.25],
            buttons: vec![true],
        };
        assert_eq!(input.axis(0), 0.25);
        assert_eq!(input.axis(7), 0.0);
        assert!(input.button(0));
        assert!(!input.button(20));
    }
}
