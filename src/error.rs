use crate::driver::DriverError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ChassisError {
    #[error("actuator command rejected: {0}")]
    ActuatorCommandRejected(#[from] DriverError),
    #[error("{name} {value} is out of range")]
    OutOfRangeSetpoint { name: &'static str, value: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, ChassisError>;

/// Reject `value` unless it is finite and inside `range`.
pub(crate) fn check_range(
    name: &'static str,
    value: f64,
    range: impl std::ops::RangeBounds<f64>,
) -> Result<f64> {
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        Err(ChassisError::OutOfRangeSetpoint { name, value })
    }
}
