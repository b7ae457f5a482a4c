//! Heading hold PID loop over the compass domain.
//!
//! The loop runs once per control tick. Integral and derivative terms are
//! per tick (sum of errors and change in error) so the gains do not depend
//! on the control period.

use crate::configuration::HeadingConfig;
use serde::Serialize;
use tracing::{trace, warn};

/// Shortest signed angle in degrees that takes `current` to `desired`.
///
/// Result is in (-180, 180]. Inputs may be any finite angle.
pub fn circular_error(desired: f64, current: f64) -> f64 {
    let error = (desired - current + 540.0).rem_euclid(360.0) - 180.0;
    if error <= -180.0 {
        error + 360.0
    } else {
        error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeadingState {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone)]
pub struct HeadingController {
    kp: f64,
    ki: f64,
    kd: f64,
    tolerance: f64,
    output_limit: f64,
    setpoint: f64,
    state: HeadingState,
    integral: f64,
    previous_error: Option<f64>,
    last_error: Option<f64>,
    last_input: Option<f64>,
    last_output: f64,
}

impl HeadingController {
    pub fn new(config: &HeadingConfig, setpoint: f64) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            tolerance: config.tolerance,
            output_limit: config.output_limit.abs(),
            setpoint: setpoint.rem_euclid(360.0),
            state: HeadingState::Disabled,
            integral: 0.0,
            previous_error: None,
            last_error: None,
            last_input: None,
            last_output: 0.0,
        }
    }

    pub fn state(&self) -> HeadingState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == HeadingState::Enabled
    }

    /// Enabling always starts from a clean integrator.
    pub fn enable(&mut self) {
        self.reset();
        self.state = HeadingState::Enabled;
    }

    pub fn disable(&mut self) {
        self.state = HeadingState::Disabled;
        self.last_output = 0.0;
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.last_error = None;
        self.last_output = 0.0;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Caller is expected to have validated `setpoint` against [0, 360).
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    pub fn last_input(&self) -> Option<f64> {
        self.last_input
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Run one tick of the loop against the measured `heading`.
    ///
    /// Returns zero while disabled. A non-finite `heading` leaves the loop
    /// state untouched and repeats the previous output.
    pub fn compute_output(&mut self, heading: f64) -> f64 {
        if !heading.is_finite() {
            warn!(heading, "ignoring non-finite heading sample");
            return self.last_output;
        }
        self.last_input = Some(heading);
        if !self.is_enabled() {
            return 0.0;
        }
        let error = circular_error(self.setpoint, heading);
        self.integral += error;
        let derivative = self
            .previous_error
            .map(|previous| error - previous)
            .unwrap_or_default();
        self.previous_error = Some(error);
        self.last_error = Some(error);

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        let output = if raw.is_finite() {
            raw.clamp(-self.output_limit, self.output_limit)
        } else {
            0.0
        };
        trace!(heading, setpoint = self.setpoint, error, output, "heading loop");
        self.last_output = output;
        output
    }

    /// True once the last computed error is within tolerance.
    pub fn is_on_target(&self) -> bool {
        self.last_error
            .map(|error| error.abs() <= self.tolerance)
            .unwrap_or(false)
    }
}
