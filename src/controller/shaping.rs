//! Signal shaping for analog inputs
//!
//! Pure per-tick functions applied between the raw (calibrated) stick
//! reading and the integer command value:
//!
//! ```text
//! raw ─► deadzone (axis | radial) ─► anti-deadzone ─► expo ─► scale ─► rate limit
//! ```
//!
//! Every deadzone maps inputs below the threshold to exactly 0 and rescales
//! the rest linearly so the output is continuous at the threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::command::Field;

/// Which deadzone is applied to the stick pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadzoneShape {
    /// Independent cutoff per axis
    Axis,
    /// Cutoff on the Euclidean magnitude of an X/Y pair
    Radial,
}

/// Tuning shared by every shaped axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shaping {
    pub shape: DeadzoneShape,
    pub deadzone: f32,
    pub anti_deadzone: f32,
    pub expo: f32,
}

/// Zeroes `value` inside the deadzone and rescales the rest to reach 1.0 again.
///
/// # Examples
///
/// ```
/// use rovlink::controller::shaping::axis_deadzone;
///
/// assert_eq!(axis_deadzone(0.05, 0.1), 0.0);
/// assert_eq!(axis_deadzone(-1.0, 0.1), -1.0);
/// assert!((axis_deadzone(0.55, 0.1) - 0.5).abs() < 1e-6);
/// ```
pub fn axis_deadzone(value: f32, threshold: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude < threshold || magnitude == 0.0 {
        return 0.0;
    }
    ((magnitude - threshold) / (1.0 - threshold)).min(1.0).copysign(value)
}

/// Deadzone on the stick's distance from center, keeping its direction
pub fn radial_deadzone(x: f32, y: f32, threshold: f32) -> (f32, f32) {
    let magnitude = x.hypot(y);
    if magnitude < threshold || magnitude <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let scale = ((magnitude - threshold) / (1.0 - threshold)).min(1.0);
    (x / magnitude * scale, y / magnitude * scale)
}

/// Pushes nonzero values outward by `amount`, keeping the sign
pub fn anti_deadzone(value: f32, amount: f32) -> f32 {
    if value == 0.0 {
        return 0.0;
    }
    (value.abs() + amount).min(1.0).copysign(value)
}

/// `sign(v) * |v|^(1 + e)`; `e = 0` is linear
pub fn expo(value: f32, exponent: f32) -> f32 {
    if exponent <= 1e-6 {
        return value;
    }
    value.abs().powf(1.0 + exponent).copysign(value)
}

/// Moves from `previous` towards `target` by at most `max_step` (0 disables)
pub fn rate_limit(previous: i32, target: i32, max_step: i32) -> i32 {
    if max_step <= 0 {
        return target;
    }
    target.clamp(previous.saturating_sub(max_step), previous.saturating_add(max_step))
}

impl Shaping {
    /// Shapes one stick (X/Y pair) through deadzone, anti-deadzone and expo
    pub fn stick(&self, x: f32, y: f32) -> (f32, f32) {
        let (x, y) = match self.shape {
            DeadzoneShape::Axis => (
                axis_deadzone(x, self.deadzone),
                axis_deadzone(y, self.deadzone),
            ),
            DeadzoneShape::Radial => radial_deadzone(x, y, self.deadzone),
        };
        let finish = |v: f32| expo(anti_deadzone(v, self.anti_deadzone), self.expo);
        (finish(x), finish(y))
    }
}

/// Per-field memory of the previous tick's output
#[derive(Debug, Default)]
pub struct RateLimiter {
    max_step: i32,
    previous: HashMap<Field, i32>,
}

impl RateLimiter {
    pub fn new(max_step: i32) -> Self {
        Self {
            max_step,
            previous: HashMap::new(),
        }
    }

    pub fn limit(&mut self, field: Field, target: i32) -> i32 {
        let previous = self.previous.get(&field).copied().unwrap_or(0);
        let output = rate_limit(previous, target, self.max_step);
        self.previous.insert(field, output);
        output
    }

    /// Forgets history so the next output starts from neutral
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

/// Rising-edge detector for a button
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector {
    was_pressed: bool,
}

impl EdgeDetector {
    /// True only on the tick the button goes from released to pressed
    pub fn rising(&mut self, pressed: bool) -> bool {
        let edge = pressed && !self.was_pressed;
        self.was_pressed = pressed;
        edge
    }

    /// Sets the remembered state without reporting an edge
    pub fn prime(&mut self, pressed: bool) {
        self.was_pressed = pressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_axis_deadzone_boundary() {
        let t = 0.1;
        for v in [0.0, 0.05, 0.0999, -0.0999] {
            assert_eq!(axis_deadzone(v, t), 0.0);
        }
        // continuous at the threshold
        assert!(axis_deadzone(t, t).abs() < EPS);

        let mut last = 0.0;
        for step in 1..=100 {
            let v = t + step as f32 * 0.009;
            let out = axis_deadzone(v, t);
            assert!(out > last, "{} -> {} not above {}", v, out, last);
            last = out;
        }
        assert!((axis_deadzone(1.0, t) - 1.0).abs() < EPS);
        assert!((axis_deadzone(-1.0, t) + 1.0).abs() < EPS);
        assert!((axis_deadzone(0.55, t) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_radial_deadzone() {
        assert_eq!(radial_deadzone(0.05, 0.05, 0.1), (0.0, 0.0));

        // direction preserved, magnitude rescaled
        let (x, y) = radial_deadzone(0.6, 0.8, 0.2);
        assert!((x.hypot(y) - 1.0).abs() < 1e-5);
        assert!((x / y - 0.75).abs() < 1e-5);

        let (x, y) = radial_deadzone(0.0, -0.6, 0.2);
        assert!(x.abs() < EPS);
        assert!((y + 0.5).abs() < EPS);

        // a diagonal that escapes the unit circle is capped
        let (x, y) = radial_deadzone(1.0, 1.0, 0.1);
        assert!(x.hypot(y) <= 1.0 + EPS);
    }

    #[test]
    fn test_anti_deadzone() {
        assert_eq!(anti_deadzone(0.0, 0.06), 0.0);
        assert!((anti_deadzone(0.01, 0.06) - 0.07).abs() < EPS);
        assert!((anti_deadzone(-0.01, 0.06) + 0.07).abs() < EPS);
        assert_eq!(anti_deadzone(0.98, 0.06), 1.0);
    }

    #[test]
    fn test_expo() {
        assert_eq!(expo(0.3, 0.0), 0.3);
        assert!((expo(0.5, 1.0) - 0.25).abs() < EPS);
        assert!((expo(-0.5, 1.0) + 0.25).abs() < EPS);
        assert_eq!(expo(1.0, 0.4), 1.0);
        assert_eq!(expo(0.0, 0.4), 0.0);
        // flattened near center
        assert!(expo(0.2, 0.25) < 0.2);
    }

    #[test]
    fn test_rate_limit_ramps_towards_target() {
        let mut output = 0;
        let mut ticks = 0;
        while output != 1000 {
            let next = rate_limit(output, 1000, 50);
            assert!(next - output <= 50);
            assert!(next > output);
            output = next;
            ticks += 1;
        }
        assert_eq!(ticks, 20);

        assert_eq!(rate_limit(0, -30, 50), -30);
        assert_eq!(rate_limit(0, -300, 50), -50);
        assert_eq!(rate_limit(10, 500, 0), 500);
    }

    #[test]
    fn test_rate_limiter_is_per_field() {
        let mut limiter = RateLimiter::new(10);
        assert_eq!(limiter.limit(Field::Surge, 100), 10);
        assert_eq!(limiter.limit(Field::Yaw, -100), -10);
        assert_eq!(limiter.limit(Field::Surge, 100), 20);
        limiter.reset();
        assert_eq!(limiter.limit(Field::Surge, 100), 10);
    }

    #[test]
    fn test_edge_detector_fires_once_per_press() {
        let mut edge = EdgeDetector::default();
        let presses = [false, true, true, true, false, true, false];
        let edges: Vec<bool> = presses.iter().map(|&p| edge.rising(p)).collect();
        assert_eq!(edges, [false, true, false, false, false, true, false]);

        edge.prime(true);
        assert!(!edge.rising(true));
    }

    #[test]
    fn test_stick_pipeline() {
        let shaping = Shaping {
            shape: DeadzoneShape::Axis,
            deadzone: 0.1,
            anti_deadzone: 0.05,
            expo: 0.0,
        };
        assert_eq!(shaping.stick(0.05, -0.09), (0.0, 0.0));
        let (x, _) = shaping.stick(0.55, 0.0);
        assert!((x - 0.55).abs() < EPS);
        assert_eq!(shaping.stick(1.0, -1.0), (1.0, -1.0));
    }
}
