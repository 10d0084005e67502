//! Device link typestate: Disconnected → Calibrating → Active
//!
//! Calibration offsets only exist while a device is attached. They are
//! captured once per connection and dropped when the device goes away.

use statum::{machine, state};
use tracing::{debug, info};

use super::backend::RawInput;

#[derive(Debug, Clone)]
pub struct AttachedDevice {
    pub name: String,
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected,
    Calibrating(AttachedDevice),
    Active,
}

#[machine]
#[derive(Debug)]
pub struct InputLink<S: LinkState> {
    // Axes resting beyond this magnitude get an offset
    stuck_threshold: f32,

    // (axis index, resting value)
    offsets: Vec<(usize, f32)>,

    device: Option<String>,
}

impl<S: LinkState> InputLink<S> {
    pub fn offsets(&self) -> &[(usize, f32)] {
        &self.offsets
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

impl InputLink<Disconnected> {
    pub fn create(stuck_threshold: f32) -> Self {
        Self::new(stuck_threshold, Vec::new(), None)
    }

    pub fn attach(self, name: String) -> InputLink<Calibrating> {
        info!("Controller connected: {}", name);
        self.transition_with(AttachedDevice { name })
    }
}

impl InputLink<Calibrating> {
    /// Records the resting value of every monitored axis that sits beyond
    /// the stuck threshold, then activates the link
    pub fn calibrate(mut self, sample: &RawInput, monitored: &[usize]) -> InputLink<Active> {
        let threshold = self.stuck_threshold;
        self.device = self.get_state_data().map(|device| device.name.clone());
        self.offsets = monitored
            .iter()
            .map(|&axis| (axis, sample.axis(axis)))
            .filter(|(_, resting)| resting.abs() > threshold)
            .collect();

        for (axis, offset) in &self.offsets {
            info!("Calibrating axis {}: offset {:.3}", axis, offset);
        }
        debug!("Calibration done, {} offsets", self.offsets.len());
        self.transition()
    }

    /// Calibration sample could not be read
    pub fn abort(self) -> InputLink<Disconnected> {
        self.transition()
    }
}

impl InputLink<Active> {
    /// `clamp(raw - offset, -1, 1)`
    pub fn calibrated(&self, input: &RawInput, axis: usize) -> f32 {
        let offset = self
            .offsets
            .iter()
            .find(|(index, _)| *index == axis)
            .map(|(_, offset)| *offset)
            .unwrap_or(0.0);
        (input.axis(axis) - offset).clamp(-1.0, 1.0)
    }

    pub fn detach(mut self) -> InputLink<Disconnected> {
        self.offsets.clear();
        self.device = None;
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stuck_axes_get_offsets() {
        let sample = RawInput {
            axes: vec![0.02, -0.8, 0.6, -0.1, -1.0, -1.0],
            buttons: vec![],
        };
        let link = InputLink::create(0.5)
            .attach("pad".to_string())
            .calibrate(&sample, &[0, 1, 2, 3]);

        assert_eq!(link.device(), Some("pad"));
        assert_eq!(link.offsets(), &[(1, -0.8), (2, 0.6)]);

        let input = RawInput {
            axes: vec![0.5, -0.8, 1.0, 0.3],
            buttons: vec![],
        };
        assert_eq!(link.calibrated(&input, 0), 0.5);
        assert_eq!(link.calibrated(&input, 1), 0.0);
        assert!((link.calibrated(&input, 2) - 0.4).abs() < 1e-6);
        // opposite full deflection minus the offset overshoots and is clamped
        let input = RawInput {
            axes: vec![0.0, 1.0],
            buttons: vec![],
        };
        assert_eq!(link.calibrated(&input, 1), 1.0);

        let link = link.detach();
        assert!(link.offsets().is_empty());
        assert_eq!(link.device(), None);
    }
}
