pub mod simulated;

use serde::{Deserialize, Serialize};
use std::fmt;

pub type DeviceId = u8;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DriverError {
    #[error("motor controller {0} is unreachable")]
    DeviceUnreachable(DeviceId),
    #[error("motor controller {device} rejected command: {reason}")]
    CommandRejected { device: DeviceId, reason: String },
    #[error("sensor read failed: {0}")]
    SensorReadFailed(String),
}

/// How a motor controller interprets the value written to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Fraction of bus voltage in [-1, 1]
    PercentOutput,
    /// Target position in revolutions
    Position,
    /// Target velocity in revolutions per second
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorConfig {
    pub id: DeviceId,
    #[serde(default)]
    pub inverted: bool,
}

impl MotorConfig {
    pub fn new(id: DeviceId, inverted: bool) -> Self {
        Self { id, inverted }
    }

    pub fn sign(&self) -> f64 {
        if self.inverted {
            -1.0
        } else {
            1.0
        }
    }
}

/// Motor controllers sharing one command bus.
///
/// Writes are non-blocking. Switching a device's control mode clears any
/// follow target it had, so followers have to be re-attached afterwards.
pub trait ActuatorBus {
    fn set_control_mode(&mut self, device: DeviceId, mode: ControlMode) -> Result<(), DriverError>;

    fn write_command(
        &mut self,
        device: DeviceId,
        mode: ControlMode,
        value: f64,
    ) -> Result<(), DriverError>;

    /// Make `device` mirror everything written to `leader`.
    fn follow(&mut self, device: DeviceId, leader: DeviceId, inverted: bool)
        -> Result<(), DriverError>;

    /// Encoder position in revolutions.
    fn read_position(&mut self, device: DeviceId) -> Result<f64, DriverError>;

    fn reset_position(&mut self, device: DeviceId) -> Result<(), DriverError>;
}

pub trait HeadingSensor {
    /// Compass heading in degrees, [0, 360)
    fn read_heading(&mut self) -> Result<f64, DriverError>;
}

pub trait StickInput {
    /// Returns `(move, rotate)`, each in [-1, 1]
    fn read_stick_axes(&mut self) -> (f64, f64);
}
