use crate::driver::{ActuatorBus, ControlMode, DriverError};
use crate::motor_group::MotorGroup;
use std::f64::consts::PI;
use tracing::info;

/// Drive-to-distance in position mode.
///
/// Both sides get the same revolution setpoint. Travel is measured from the
/// encoder origin captured when the command starts.
#[derive(Debug, Clone)]
pub struct DistanceController {
    distance_per_revolution: f64,
    target_distance: f64,
    origin: (f64, f64),
}

impl DistanceController {
    pub fn new(distance_per_revolution: f64) -> Self {
        Self {
            distance_per_revolution,
            target_distance: 0.0,
            origin: (0.0, 0.0),
        }
    }

    pub fn from_wheel_diameter(wheel_diameter: f64) -> Self {
        Self::new(PI * wheel_diameter)
    }

    pub fn distance_per_revolution(&self) -> f64 {
        self.distance_per_revolution
    }

    pub fn target_distance(&self) -> f64 {
        self.target_distance
    }

    pub fn target_revolutions(&self) -> f64 {
        self.target_distance / self.distance_per_revolution
    }

    /// Zero the encoders, capture the origin and issue the setpoint.
    ///
    /// Returns the revolution setpoint handed to each leader.
    pub fn start(
        &mut self,
        bus: &mut dyn ActuatorBus,
        left: &mut MotorGroup,
        right: &mut MotorGroup,
        distance: f64,
    ) -> Result<f64, DriverError> {
        left.set_control_mode(bus, ControlMode::Position)?;
        right.set_control_mode(bus, ControlMode::Position)?;
        left.reset_position(bus)?;
        right.reset_position(bus)?;
        self.origin = (left.position(bus)?, right.position(bus)?);
        self.target_distance = distance;

        let revolutions = self.target_revolutions();
        left.issue_command(bus, self.origin.0 + revolutions)?;
        right.issue_command(bus, self.origin.1 + revolutions)?;
        info!(distance, revolutions, "driving distance");
        Ok(revolutions)
    }

    /// Revolutions travelled since the origin, averaged over both sides.
    pub fn revolutions(
        &self,
        bus: &mut dyn ActuatorBus,
        left: &MotorGroup,
        right: &MotorGroup,
    ) -> Result<f64, DriverError> {
        let left_travel = left.position(bus)? - self.origin.0;
        let right_travel = right.position(bus)? - self.origin.1;
        Ok((left_travel + right_travel) / 2.0)
    }

    pub fn distance(
        &self,
        bus: &mut dyn ActuatorBus,
        left: &MotorGroup,
        right: &MotorGroup,
    ) -> Result<f64, DriverError> {
        Ok(self.revolutions(bus, left, right)? * self.distance_per_revolution)
    }

    pub fn error(
        &self,
        bus: &mut dyn ActuatorBus,
        left: &MotorGroup,
        right: &MotorGroup,
    ) -> Result<f64, DriverError> {
        Ok((self.distance(bus, left, right)? - self.target_distance).abs())
    }

    pub fn is_on_target(
        &self,
        bus: &mut dyn ActuatorBus,
        left: &MotorGroup,
        right: &MotorGroup,
        tolerance: f64,
    ) -> Result<bool, DriverError> {
        Ok(self.error(bus, left, right)? < tolerance)
    }
}
