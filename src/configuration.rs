use config::Config;
use serde::Deserialize;
use std::{collections::BTreeSet, path::PathBuf};
use tracing::*;

use crate::{driver::MotorConfig, error::ChassisError};

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub chassis: ChassisConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let builder = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder().add_source(config::File::with_name(
                config
                    .to_str()
                    .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
            ))
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
        };
        // APP_CHASSIS__SPEED_SCALE=0.5 overrides chassis.speed_scale
        let settings = builder.add_source(environment("APP")).build()?;

        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ChassisError> {
        self.chassis.validate()?;
        self.sim.validate()
    }
}

fn environment(prefix: &str) -> config::Environment {
    config::Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[derive(Deserialize, Debug, Clone)]
pub struct SideConfig {
    pub leader: MotorConfig,
    #[serde(default)]
    pub followers: Vec<MotorConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChassisConfig {
    pub left: SideConfig,
    pub right: SideConfig,
    #[serde(default = "default_wheel_diameter")]
    pub wheel_diameter: f64,
    #[serde(default = "default_speed_scale")]
    pub speed_scale: f64,
    #[serde(default = "default_velocity_bias")]
    pub default_velocity_bias: f64,
    #[serde(default)]
    pub heading: HeadingConfig,
    #[serde(default)]
    pub distance: DistanceConfig,
    #[serde(default)]
    pub open_loop: OpenLoopConfig,
}

fn default_wheel_diameter() -> f64 {
    8.0
}

fn default_speed_scale() -> f64 {
    1.0
}

fn default_velocity_bias() -> f64 {
    0.75
}

impl ChassisConfig {
    pub fn validate(&self) -> Result<(), ChassisError> {
        let mut seen = BTreeSet::new();
        for motor in self.motors() {
            if !seen.insert(motor.id) {
                return Err(ChassisError::InvalidConfiguration(format!(
                    "motor id {} is used more than once",
                    motor.id
                )));
            }
        }
        if !(self.wheel_diameter.is_finite() && self.wheel_diameter > 0.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "wheel diameter must be positive, got {}",
                self.wheel_diameter
            )));
        }
        if !(self.speed_scale > 0.0 && self.speed_scale <= 1.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "speed scale must be in (0, 1], got {}",
                self.speed_scale
            )));
        }
        if !(-1.0..=1.0).contains(&self.default_velocity_bias) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "velocity bias must be in [-1, 1], got {}",
                self.default_velocity_bias
            )));
        }
        self.heading.validate()?;
        if !(self.distance.tolerance.is_finite() && self.distance.tolerance >= 0.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "distance tolerance must be finite and not negative, got {}",
                self.distance.tolerance
            )));
        }
        if !self.open_loop.forward_trim.is_finite() {
            return Err(ChassisError::InvalidConfiguration(String::from(
                "forward trim must be finite",
            )));
        }
        Ok(())
    }

    pub fn motors(&self) -> impl Iterator<Item = &MotorConfig> {
        std::iter::once(&self.left.leader)
            .chain(self.left.followers.iter())
            .chain(std::iter::once(&self.right.leader))
            .chain(self.right.followers.iter())
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct HeadingConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Degrees
    pub tolerance: f64,
    pub output_limit: f64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            kp: 0.3,
            ki: 0.0005,
            kd: 0.0,
            tolerance: 0.25,
            output_limit: 1.0,
        }
    }
}

impl HeadingConfig {
    pub fn validate(&self) -> Result<(), ChassisError> {
        let gains = [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)];
        if let Some((name, value)) = gains.into_iter().find(|(_, value)| !value.is_finite()) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "heading {name} must be finite, got {value}"
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "heading tolerance must be finite and not negative, got {}",
                self.tolerance
            )));
        }
        if !(self.output_limit.is_finite() && self.output_limit > 0.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "heading output limit must be positive, got {}",
                self.output_limit
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct DistanceConfig {
    /// Tolerance used when polling distance hold for telemetry
    pub tolerance: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self { tolerance: 0.1 }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct OpenLoopConfig {
    /// Rotation mixed into `forward` to cancel drivetrain pull
    pub forward_trim: f64,
}

impl Default for OpenLoopConfig {
    fn default() -> Self {
        Self { forward_trim: -0.2 }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct SimConfig {
    pub control_period_ms: u64,
    pub max_revolutions_per_second: f64,
    /// Distance between wheel contact patches, same unit as the wheel diameter
    pub track_width: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            control_period_ms: 20,
            max_revolutions_per_second: 1.5,
            track_width: 24.0,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ChassisError> {
        if self.control_period_ms == 0 {
            return Err(ChassisError::InvalidConfiguration(String::from(
                "control period must be at least 1 ms",
            )));
        }
        if !(self.max_revolutions_per_second.is_finite() && self.max_revolutions_per_second > 0.0)
        {
            return Err(ChassisError::InvalidConfiguration(format!(
                "max revolutions per second must be positive, got {}",
                self.max_revolutions_per_second
            )));
        }
        if !(self.track_width.is_finite() && self.track_width > 0.0) {
            return Err(ChassisError::InvalidConfiguration(format!(
                "track width must be positive, got {}",
                self.track_width
            )));
        }
        Ok(())
    }
}
