//! Chassis mode state machine.
//!
//! The controller is ticked once per control period by an external
//! scheduler. Callers switch modes between ticks through the `enter_*`
//! methods. Every switch commands both sides to zero before the new mode's
//! entry actions run. A hardware fault during a switch or a tick leaves the
//! chassis idle.

use crate::{
    configuration::ChassisConfig,
    distance_controller::DistanceController,
    drive_mixer::SideCommand,
    driver::{ActuatorBus, ControlMode, DriverError, HeadingSensor, Side, StickInput},
    error::{check_range, ChassisError, Result},
    heading_controller::HeadingController,
    motor_group::MotorGroup,
};
use serde::Serialize;
use std::ops::Bound;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ChassisMode {
    Idle,
    ManualArcade,
    HeadingHold,
    DistanceHold,
    /// Fixed arcade command, used by `forward`, `reverse` and `rotate`
    OpenLoop { move_cmd: f64, rotate_cmd: f64 },
}

/// Read-only snapshot for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub mode: ChassisMode,
    /// Last heading sample used by the heading loop, `None` outside heading hold
    pub heading: Option<f64>,
    pub heading_setpoint: f64,
    pub heading_output: f64,
    pub heading_on_target: Option<bool>,
    pub side_command: SideCommand,
    pub distance: Option<f64>,
    pub distance_setpoint: Option<f64>,
    pub distance_on_target: Option<bool>,
    pub speed_scale: f64,
    pub velocity_bias: f64,
}

pub struct ChassisController<B, H, S> {
    bus: B,
    imu: H,
    sticks: S,
    left: MotorGroup,
    right: MotorGroup,
    heading: HeadingController,
    distance: DistanceController,
    mode: ChassisMode,
    speed_scale: f64,
    velocity_bias: f64,
    forward_trim: f64,
    distance_tolerance: f64,
    last_command: SideCommand,
    last_distance: Option<f64>,
    distance_on_target: Option<bool>,
}

impl<B, H, S> ChassisController<B, H, S>
where
    B: ActuatorBus,
    H: HeadingSensor,
    S: StickInput,
{
    /// Build both motor groups from `config` and start idle.
    pub fn from_config(config: &ChassisConfig, bus: B, imu: H, sticks: S) -> Result<Self> {
        let left = MotorGroup::new(
            Side::Left,
            config.left.leader,
            config.left.followers.clone(),
        );
        let right = MotorGroup::new(
            Side::Right,
            config.right.leader,
            config.right.followers.clone(),
        );
        Self::new(config, left, right, bus, imu, sticks)
    }

    /// Start idle with the heading setpoint at the current heading.
    pub fn new(
        config: &ChassisConfig,
        left: MotorGroup,
        right: MotorGroup,
        bus: B,
        mut imu: H,
        sticks: S,
    ) -> Result<Self> {
        info!("Chassis starting...");
        config.validate()?;
        let initial_heading = imu.read_heading()?;
        let mut chassis = Self {
            bus,
            imu,
            sticks,
            left,
            right,
            heading: HeadingController::new(&config.heading, initial_heading),
            distance: DistanceController::from_wheel_diameter(config.wheel_diameter),
            mode: ChassisMode::Idle,
            speed_scale: config.speed_scale,
            velocity_bias: 0.0,
            forward_trim: config.open_loop.forward_trim,
            distance_tolerance: config.distance.tolerance,
            last_command: SideCommand::stopped(),
            last_distance: None,
            distance_on_target: None,
        };
        chassis.stop_outputs()?;
        info!("Chassis is running.");
        Ok(chassis)
    }

    pub fn enter_idle(&mut self) -> Result<()> {
        self.transition(ChassisMode::Idle, |_| Ok(()))
    }

    pub fn enter_manual(&mut self) -> Result<()> {
        self.transition(ChassisMode::ManualArcade, |_| Ok(()))
    }

    /// Hold `setpoint` degrees while driving forward at `velocity_bias`.
    pub fn enter_heading_hold(&mut self, setpoint: f64, velocity_bias: f64) -> Result<()> {
        let setpoint = check_range("heading setpoint", setpoint, 0.0..360.0)?;
        let velocity_bias = check_range("velocity bias", velocity_bias, -1.0..=1.0)?;
        self.transition(ChassisMode::HeadingHold, |chassis| {
            chassis.heading.set_setpoint(setpoint);
            chassis.heading.enable();
            chassis.velocity_bias = velocity_bias;
            Ok(())
        })
    }

    /// Drive `distance` length units straight ahead in position mode.
    pub fn enter_distance_hold(&mut self, distance: f64) -> Result<()> {
        let distance = check_range("distance", distance, ..)?;
        self.transition(ChassisMode::DistanceHold, |chassis| {
            chassis
                .distance
                .start(&mut chassis.bus, &mut chassis.left, &mut chassis.right, distance)?;
            chassis.last_distance = Some(0.0);
            chassis.distance_on_target = Some(distance.abs() < chassis.distance_tolerance);
            Ok(())
        })
    }

    /// Open loop arcade command.
    ///
    /// Already in open loop the new command replaces the old one without
    /// an intermediate stop and takes effect on the next tick.
    pub fn enter_open_loop(&mut self, move_cmd: f64, rotate_cmd: f64) -> Result<()> {
        let move_cmd = check_range("move command", move_cmd, -1.0..=1.0)?;
        let rotate_cmd = check_range("rotate command", rotate_cmd, -1.0..=1.0)?;
        let next = ChassisMode::OpenLoop {
            move_cmd,
            rotate_cmd,
        };
        if let ChassisMode::OpenLoop { .. } = self.mode {
            self.mode = next;
            return Ok(());
        }
        self.transition(next, |_| Ok(()))
    }

    /// Drive forward with the configured trim against drivetrain pull.
    pub fn forward(&mut self, velocity: f64) -> Result<()> {
        self.enter_open_loop(velocity, self.forward_trim)
    }

    pub fn reverse(&mut self, velocity: f64) -> Result<()> {
        self.enter_open_loop(-velocity, 0.0)
    }

    pub fn rotate(&mut self, velocity: f64) -> Result<()> {
        self.enter_open_loop(velocity, 1.0)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.enter_idle()
    }

    pub fn set_speed_scale(&mut self, factor: f64) -> Result<()> {
        self.speed_scale = check_range(
            "speed scale",
            factor,
            (Bound::Excluded(0.0), Bound::Included(1.0)),
        )?;
        Ok(())
    }

    pub fn set_heading_setpoint(&mut self, setpoint: f64) -> Result<()> {
        let setpoint = check_range("heading setpoint", setpoint, 0.0..360.0)?;
        self.heading.set_setpoint(setpoint);
        Ok(())
    }

    pub fn set_velocity_bias(&mut self, velocity_bias: f64) -> Result<()> {
        self.velocity_bias = check_range("velocity bias", velocity_bias, -1.0..=1.0)?;
        Ok(())
    }

    /// `None` unless holding heading.
    pub fn is_heading_on_target(&self) -> Option<bool> {
        match self.mode {
            ChassisMode::HeadingHold => Some(self.heading.is_on_target()),
            _ => None,
        }
    }

    /// `None` unless driving a distance.
    pub fn is_distance_on_target(&mut self, tolerance: f64) -> Result<Option<bool>> {
        match self.mode {
            ChassisMode::DistanceHold => Ok(Some(self.distance.is_on_target(
                &mut self.bus,
                &self.left,
                &self.right,
                tolerance,
            )?)),
            _ => Ok(None),
        }
    }

    /// Advance one control period.
    pub fn tick(&mut self) -> Result<()> {
        if let Err(err) = self.run_tick() {
            return Err(self.fail_safe(err));
        }
        Ok(())
    }

    fn run_tick(&mut self) -> std::result::Result<(), DriverError> {
        match self.mode {
            ChassisMode::Idle => self.drive(SideCommand::stopped()),
            ChassisMode::ManualArcade => {
                let (move_cmd, rotate_cmd) = self.sticks.read_stick_axes();
                self.drive(SideCommand::from_arcade(
                    move_cmd,
                    rotate_cmd,
                    self.speed_scale,
                ))
            }
            ChassisMode::OpenLoop {
                move_cmd,
                rotate_cmd,
            } => self.drive(SideCommand::from_arcade(
                move_cmd,
                rotate_cmd,
                self.speed_scale,
            )),
            ChassisMode::HeadingHold => {
                let heading = self.imu.read_heading()?;
                if !heading.is_finite() {
                    return Err(DriverError::SensorReadFailed(format!(
                        "heading {heading} is not finite"
                    )));
                }
                let correction = self.heading.compute_output(heading);
                self.drive(SideCommand::from_arcade(
                    self.velocity_bias,
                    -correction,
                    self.speed_scale,
                ))
            }
            ChassisMode::DistanceHold => {
                let distance = self.distance.distance(&mut self.bus, &self.left, &self.right)?;
                let on_target =
                    (distance - self.distance.target_distance()).abs() < self.distance_tolerance;
                if on_target && self.distance_on_target == Some(false) {
                    info!(distance, "distance reached");
                }
                self.last_distance = Some(distance);
                self.distance_on_target = Some(on_target);
                Ok(())
            }
        }
    }

    fn transition<F>(&mut self, next: ChassisMode, entry: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> std::result::Result<(), DriverError>,
    {
        if let Err(err) = self.run_transition(entry) {
            return Err(self.fail_safe(err));
        }
        if self.mode != next {
            info!(from = ?self.mode, to = ?next, "chassis mode change");
        }
        self.mode = next;
        Ok(())
    }

    fn run_transition<F>(&mut self, entry: F) -> std::result::Result<(), DriverError>
    where
        F: FnOnce(&mut Self) -> std::result::Result<(), DriverError>,
    {
        self.stop_outputs()?;
        self.heading.disable();
        self.velocity_bias = 0.0;
        self.last_distance = None;
        self.distance_on_target = None;
        entry(self)
    }

    fn fail_safe(&mut self, err: DriverError) -> ChassisError {
        error!(%err, mode = ?self.mode, "hardware fault, forcing chassis idle");
        self.mode = ChassisMode::Idle;
        self.heading.disable();
        self.velocity_bias = 0.0;
        self.last_distance = None;
        self.distance_on_target = None;
        if let Err(stop_err) = self.stop_outputs() {
            warn!(%stop_err, "failed to stop motors after fault");
        }
        ChassisError::ActuatorCommandRejected(err)
    }

    /// Zero both sides in percent output. Both sides are attempted even if
    /// the first one fails.
    fn stop_outputs(&mut self) -> std::result::Result<(), DriverError> {
        let left = stop_group(&mut self.bus, &mut self.left);
        let right = stop_group(&mut self.bus, &mut self.right);
        self.last_command = SideCommand::stopped();
        left.and(right)
    }

    fn drive(&mut self, command: SideCommand) -> std::result::Result<(), DriverError> {
        self.left.unslave(&mut self.bus, ControlMode::PercentOutput)?;
        self.right.unslave(&mut self.bus, ControlMode::PercentOutput)?;
        self.left.issue_command(&mut self.bus, command.left())?;
        self.right.issue_command(&mut self.bus, command.right())?;
        self.last_command = command;
        Ok(())
    }

    pub fn mode(&self) -> ChassisMode {
        self.mode
    }

    pub fn speed_scale(&self) -> f64 {
        self.speed_scale
    }

    pub fn velocity_bias(&self) -> f64 {
        self.velocity_bias
    }

    /// Reads the heading sensor directly.
    pub fn current_heading(&mut self) -> Result<f64> {
        Ok(self.imu.read_heading()?)
    }

    pub fn heading_setpoint(&self) -> f64 {
        self.heading.setpoint()
    }

    pub fn last_heading_output(&self) -> f64 {
        self.heading.last_output()
    }

    pub fn last_command(&self) -> SideCommand {
        self.last_command
    }

    pub fn distance_setpoint(&self) -> f64 {
        self.distance.target_distance()
    }

    /// Travel since the last distance command started.
    pub fn distance(&mut self) -> Result<f64> {
        Ok(self
            .distance
            .distance(&mut self.bus, &self.left, &self.right)?)
    }

    /// Leader positions in revolutions, corrected for inversion.
    pub fn side_positions(&mut self) -> Result<(f64, f64)> {
        Ok((
            self.left.position(&mut self.bus)?,
            self.right.position(&mut self.bus)?,
        ))
    }

    pub fn left_group(&self) -> &MotorGroup {
        &self.left
    }

    pub fn right_group(&self) -> &MotorGroup {
        &self.right
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn heading_sensor_mut(&mut self) -> &mut H {
        &mut self.imu
    }

    pub fn stick_input_mut(&mut self) -> &mut S {
        &mut self.sticks
    }

    pub fn telemetry(&self) -> Telemetry {
        let holding_heading = self.mode == ChassisMode::HeadingHold;
        let holding_distance = self.mode == ChassisMode::DistanceHold;
        Telemetry {
            mode: self.mode,
            heading: self.heading.last_input().filter(|_| holding_heading),
            heading_setpoint: self.heading.setpoint(),
            heading_output: self.heading.last_output(),
            heading_on_target: self.is_heading_on_target(),
            side_command: self.last_command,
            distance: self.last_distance,
            distance_setpoint: holding_distance.then(|| self.distance.target_distance()),
            distance_on_target: self.distance_on_target,
            speed_scale: self.speed_scale,
            velocity_bias: self.velocity_bias,
        }
    }
}

fn stop_group(
    bus: &mut dyn ActuatorBus,
    group: &mut MotorGroup,
) -> std::result::Result<(), DriverError> {
    group.unslave(bus, ControlMode::PercentOutput)?;
    group.issue_command(bus, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configuration::{DistanceConfig, HeadingConfig, OpenLoopConfig, SideConfig},
        driver::{
            simulated::{BusEvent, ScriptedSticks, SimulatedBus, SimulatedHeading},
            MotorConfig,
        },
    };
    use approx::assert_relative_eq;

    type TestChassis = ChassisController<SimulatedBus, SimulatedHeading, ScriptedSticks>;

    fn config() -> ChassisConfig {
        ChassisConfig {
            left: SideConfig {
                leader: MotorConfig::new(1, false),
                followers: vec![MotorConfig::new(2, false)],
            },
            right: SideConfig {
                leader: MotorConfig::new(3, true),
                followers: vec![MotorConfig::new(4, false)],
            },
            wheel_diameter: 8.0,
            speed_scale: 1.0,
            default_velocity_bias: 0.75,
            heading: HeadingConfig::default(),
            distance: DistanceConfig::default(),
            open_loop: OpenLoopConfig::default(),
        }
    }

    fn chassis_with(max_revolutions_per_second: f64, heading: f64) -> TestChassis {
        ChassisController::from_config(
            &config(),
            SimulatedBus::new(&[1, 2, 3, 4], max_revolutions_per_second),
            SimulatedHeading::new(heading),
            ScriptedSticks::default(),
        )
        .unwrap()
    }

    fn chassis() -> TestChassis {
        chassis_with(5.0, 0.0)
    }

    /// Outputs of the left and right leaders, as the wheels see them.
    fn wheel_outputs(chassis: &TestChassis) -> (f64, f64) {
        let bus = chassis.bus();
        (
            bus.effective_output(1).unwrap(),
            -bus.effective_output(3).unwrap(),
        )
    }

    /// Tick the chassis and the plant, turning the simulated imu.
    fn run(chassis: &mut TestChassis, ticks: usize) {
        let dt = 0.02;
        let distance_per_revolution = std::f64::consts::PI * 8.0;
        for _ in 0..ticks {
            chassis.tick().unwrap();
            let (left_before, right_before) = chassis.side_positions().unwrap();
            chassis.bus_mut().step(dt);
            let (left_after, right_after) = chassis.side_positions().unwrap();
            chassis.heading_sensor_mut().integrate(
                left_after - left_before,
                right_after - right_before,
                distance_per_revolution,
                24.0,
            );
        }
    }

    #[test]
    fn starts_idle_with_setpoint_at_current_heading() {
        let chassis = chassis_with(5.0, 123.0);
        assert_eq!(chassis.mode(), ChassisMode::Idle);
        assert_relative_eq!(chassis.heading_setpoint(), 123.0);
        assert_eq!(chassis.bus().device(1).unwrap().mode, ControlMode::PercentOutput);
    }

    #[test]
    fn manual_full_stick_at_half_speed() {
        let mut chassis = chassis();
        *chassis.stick_input_mut() = ScriptedSticks::new(1.0, 0.0);
        chassis.set_speed_scale(0.5).unwrap();
        chassis.enter_manual().unwrap();
        chassis.tick().unwrap();
        let (left, right) = wheel_outputs(&chassis);
        assert_relative_eq!(left, 0.5);
        assert_relative_eq!(right, 0.5);
        assert_relative_eq!(chassis.bus().effective_output(2).unwrap(), 0.5);
        assert_relative_eq!(chassis.bus().effective_output(4).unwrap(), -0.5);
        assert_eq!(chassis.last_command(), SideCommand::new(0.5, 0.5));
    }

    #[test]
    fn heading_error_wraps_through_north() {
        let mut chassis = chassis_with(5.0, 350.0);
        chassis.enter_heading_hold(10.0, 0.0).unwrap();
        chassis.tick().unwrap();
        let telemetry = chassis.telemetry();
        assert_eq!(telemetry.heading, Some(350.0));
        // +20 degrees of error saturates the loop and turns towards 10
        assert_relative_eq!(telemetry.heading_output, 1.0);
        let (left, right) = wheel_outputs(&chassis);
        assert_relative_eq!(left, -1.0);
        assert_relative_eq!(right, 1.0);
        assert_eq!(chassis.is_heading_on_target(), Some(false));
    }

    #[test]
    fn heading_hold_converges() {
        let mut chassis = chassis_with(1.0, 0.0);
        chassis.enter_heading_hold(30.0, 0.0).unwrap();
        run(&mut chassis, 600);
        assert_eq!(chassis.is_heading_on_target(), Some(true));
    }

    #[test]
    fn heading_hold_drives_forward_with_bias() {
        let mut chassis = chassis_with(1.0, 90.0);
        chassis.enter_heading_hold(90.0, 0.5).unwrap();
        run(&mut chassis, 1);
        let (left, right) = wheel_outputs(&chassis);
        assert_relative_eq!(left, 0.5);
        assert_relative_eq!(right, 0.5);
        assert_relative_eq!(chassis.velocity_bias(), 0.5);
    }

    #[test]
    fn leaving_heading_hold_stops_before_idle() {
        let mut chassis = chassis_with(5.0, 0.0);
        chassis.enter_heading_hold(45.0, 0.5).unwrap();
        chassis.tick().unwrap();
        assert_ne!(wheel_outputs(&chassis), (0.0, 0.0));

        chassis.bus_mut().clear_events();
        chassis.enter_idle().unwrap();
        let events = chassis.bus().events();
        assert_eq!(events.len(), 4);
        for event in events {
            match event {
                BusEvent::Command { value, mode, .. } => {
                    assert_eq!(*value, 0.0);
                    assert_eq!(*mode, ControlMode::PercentOutput);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(chassis.velocity_bias(), 0.0);
        assert_eq!(chassis.is_heading_on_target(), None);
    }

    #[test]
    fn idle_twice_is_idle_once() {
        let mut chassis = chassis();
        *chassis.stick_input_mut() = ScriptedSticks::new(0.8, 0.2);
        chassis.enter_manual().unwrap();
        chassis.tick().unwrap();

        chassis.enter_idle().unwrap();
        let once = (chassis.mode(), wheel_outputs(&chassis), chassis.last_command());
        chassis.enter_idle().unwrap();
        let twice = (chassis.mode(), wheel_outputs(&chassis), chassis.last_command());
        assert_eq!(once, twice);
        assert_eq!(once.1, (0.0, 0.0));
        chassis.tick().unwrap();
        assert_eq!(wheel_outputs(&chassis), (0.0, 0.0));
    }

    #[test]
    fn hundred_inch_drive() {
        let mut chassis = chassis();
        chassis.enter_distance_hold(100.0).unwrap();
        let left = chassis.bus().device(1).unwrap().clone();
        let right = chassis.bus().device(3).unwrap().clone();
        assert_eq!(left.mode, ControlMode::Position);
        assert_relative_eq!(left.command, 3.979, epsilon = 1e-3);
        assert_relative_eq!(-right.command, 3.979, epsilon = 1e-3);
        assert_eq!(chassis.bus().device(2).unwrap().following, Some((1, false)));
        assert_eq!(chassis.is_distance_on_target(0.1).unwrap(), Some(false));

        chassis.bus_mut().set_position(1, left.command);
        chassis.bus_mut().set_position(3, right.command);
        assert_eq!(chassis.is_distance_on_target(0.1).unwrap(), Some(true));
        assert_relative_eq!(chassis.distance_setpoint(), 100.0);
    }

    #[test]
    fn distance_hold_reports_progress() {
        let mut chassis = chassis();
        chassis.enter_distance_hold(50.0).unwrap();
        chassis.tick().unwrap();
        assert_eq!(chassis.telemetry().distance_on_target, Some(false));
        run(&mut chassis, 100);
        let telemetry = chassis.telemetry();
        assert_eq!(telemetry.distance_on_target, Some(true));
        assert_eq!(telemetry.distance_setpoint, Some(50.0));
        assert_relative_eq!(chassis.distance().unwrap(), 50.0, epsilon = 1e-6);
    }

    #[test]
    fn distance_hold_stops_before_new_mode() {
        let mut chassis = chassis();
        chassis.enter_distance_hold(50.0).unwrap();
        chassis.bus_mut().clear_events();
        chassis.enter_manual().unwrap();
        let first = chassis.bus().events()[0];
        assert_eq!(
            first,
            BusEvent::ModeSet {
                device: 1,
                mode: ControlMode::PercentOutput
            }
        );
        assert_eq!(chassis.bus().device(2).unwrap().following, None);
        assert_eq!(chassis.bus().effective_output(1), Some(0.0));
    }

    #[test]
    fn status_is_not_applicable_in_other_modes() {
        let mut chassis = chassis();
        assert_eq!(chassis.is_heading_on_target(), None);
        assert_eq!(chassis.is_distance_on_target(0.1).unwrap(), None);
        chassis.enter_heading_hold(0.0, 0.0).unwrap();
        assert_eq!(chassis.is_distance_on_target(0.1).unwrap(), None);
    }

    #[test]
    fn out_of_range_requests_leave_state_alone() {
        let mut chassis = chassis();
        chassis.enter_manual().unwrap();
        assert!(matches!(
            chassis.enter_heading_hold(360.0, 0.5),
            Err(ChassisError::OutOfRangeSetpoint { .. })
        ));
        assert!(chassis.enter_heading_hold(-1.0, 0.5).is_err());
        assert!(chassis.set_heading_setpoint(400.0).is_err());
        assert_eq!(chassis.mode(), ChassisMode::ManualArcade);
        assert_relative_eq!(chassis.heading_setpoint(), 0.0);

        assert!(chassis.set_speed_scale(0.0).is_err());
        assert!(chassis.set_speed_scale(1.01).is_err());
        assert!(chassis.set_speed_scale(f64::NAN).is_err());
        assert_relative_eq!(chassis.speed_scale(), 1.0);
        chassis.set_speed_scale(1.0).unwrap();
    }

    #[test]
    fn actuator_fault_forces_idle() {
        let mut chassis = chassis();
        *chassis.stick_input_mut() = ScriptedSticks::new(0.5, 0.0);
        chassis.enter_manual().unwrap();
        chassis.tick().unwrap();
        chassis.bus_mut().set_unreachable(3, true);
        assert!(matches!(
            chassis.tick(),
            Err(ChassisError::ActuatorCommandRejected(
                DriverError::DeviceUnreachable(3)
            ))
        ));
        assert_eq!(chassis.mode(), ChassisMode::Idle);
        // the reachable side was still stopped
        assert_eq!(chassis.bus().effective_output(1), Some(0.0));
    }

    #[test]
    fn imu_fault_during_heading_hold_forces_idle() {
        let mut chassis = chassis();
        chassis.enter_heading_hold(10.0, 0.6).unwrap();
        chassis.heading_sensor_mut().failed = true;
        assert!(chassis.tick().is_err());
        assert_eq!(chassis.mode(), ChassisMode::Idle);
        assert_eq!(chassis.velocity_bias(), 0.0);
    }

    #[test]
    fn non_finite_heading_forces_idle_and_recovers() {
        let mut chassis = chassis();
        chassis.enter_heading_hold(30.0, 0.0).unwrap();
        chassis.tick().unwrap();
        assert_relative_eq!(chassis.last_heading_output(), 1.0);

        chassis.heading_sensor_mut().heading = f64::NAN;
        assert!(matches!(
            chassis.tick(),
            Err(ChassisError::ActuatorCommandRejected(
                DriverError::SensorReadFailed(_)
            ))
        ));
        assert_eq!(chassis.mode(), ChassisMode::Idle);
        assert_eq!(chassis.last_command(), SideCommand::stopped());

        chassis.heading_sensor_mut().heading = 0.0;
        chassis.enter_heading_hold(30.0, 0.0).unwrap();
        for _ in 0..50 {
            chassis.tick().unwrap();
        }
        assert_relative_eq!(chassis.last_heading_output(), 1.0);
        assert_eq!(chassis.is_heading_on_target(), Some(false));
    }

    #[test]
    fn open_loop_helpers() {
        let mut chassis = chassis();
        chassis.forward(0.5).unwrap();
        chassis.tick().unwrap();
        let (left, right) = wheel_outputs(&chassis);
        assert_relative_eq!(left, 0.3, epsilon = 1e-12);
        assert_relative_eq!(right, 0.7, epsilon = 1e-12);

        chassis.reverse(0.4).unwrap();
        chassis.tick().unwrap();
        assert_eq!(chassis.last_command(), SideCommand::new(-0.4, -0.4));

        chassis.rotate(0.0).unwrap();
        chassis.tick().unwrap();
        assert_eq!(chassis.last_command(), SideCommand::new(1.0, -1.0));

        chassis.stop().unwrap();
        assert_eq!(chassis.mode(), ChassisMode::Idle);
        assert_eq!(wheel_outputs(&chassis), (0.0, 0.0));
    }

    #[test]
    fn setpoint_and_bias_can_change_while_holding() {
        let mut chassis = chassis_with(5.0, 0.0);
        chassis.enter_heading_hold(0.0, 0.2).unwrap();
        chassis.set_heading_setpoint(270.0).unwrap();
        chassis.set_velocity_bias(0.4).unwrap();
        chassis.tick().unwrap();
        // shortest way to 270 is a left turn
        let (left, right) = wheel_outputs(&chassis);
        assert_relative_eq!(left, 1.0);
        assert_relative_eq!(right, -0.6, epsilon = 1e-12);
    }

    #[test]
    fn telemetry_serializes() {
        let chassis = chassis();
        let json = serde_json::to_string(&chassis.telemetry()).unwrap();
        assert!(json.contains("\"mode\":\"Idle\""));
    }

    #[test]
    fn telemetry_heading_only_while_holding() {
        let mut chassis = chassis_with(5.0, 120.0);
        chassis.enter_heading_hold(120.0, 0.0).unwrap();
        chassis.tick().unwrap();
        assert_eq!(chassis.telemetry().heading, Some(120.0));

        chassis.enter_idle().unwrap();
        chassis.heading_sensor_mut().heading = 200.0;
        chassis.tick().unwrap();
        assert_eq!(chassis.telemetry().heading, None);
        assert_relative_eq!(chassis.current_heading().unwrap(), 200.0);
    }
}
