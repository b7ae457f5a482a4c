//! One gearbox side: a leader motor controller plus the followers geared to it.

use crate::driver::{ActuatorBus, ControlMode, DeviceId, DriverError, MotorConfig, Side};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Linkage {
    /// Followers mirror the leader in hardware.
    Slaved,
    /// Every controller is written on its own.
    Unslaved,
}

#[derive(Debug)]
pub struct MotorGroup {
    side: Side,
    leader: MotorConfig,
    followers: Vec<MotorConfig>,
    control_mode: Option<ControlMode>,
    linkage: Linkage,
    leader_command: f64,
}

impl MotorGroup {
    /// Nothing is written to the bus until the first mode switch.
    pub fn new(side: Side, leader: MotorConfig, followers: Vec<MotorConfig>) -> Self {
        Self {
            side,
            leader,
            followers,
            control_mode: None,
            linkage: Linkage::Unslaved,
            leader_command: 0.0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn leader(&self) -> &MotorConfig {
        &self.leader
    }

    pub fn followers(&self) -> &[MotorConfig] {
        &self.followers
    }

    pub fn control_mode(&self) -> Option<ControlMode> {
        self.control_mode
    }

    pub fn is_slaved(&self) -> bool {
        self.linkage == Linkage::Slaved
    }

    /// Last setpoint issued to the leader, before leader inversion.
    pub fn leader_command(&self) -> f64 {
        self.leader_command
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        std::iter::once(self.leader.id)
            .chain(self.followers.iter().map(|follower| follower.id))
            .collect()
    }

    /// Switch the whole group to `mode` with followers attached to the leader.
    ///
    /// Mode switches clear a follower's follow target so followers are
    /// re-attached every time. No-op when already slaved in `mode`.
    pub fn set_control_mode(
        &mut self,
        bus: &mut dyn ActuatorBus,
        mode: ControlMode,
    ) -> Result<(), DriverError> {
        if self.control_mode == Some(mode) && self.is_slaved() {
            return Ok(());
        }
        self.apply_mode(bus, mode, Linkage::Slaved)
    }

    /// Switch every controller to independent control in `mode`.
    ///
    /// Followers become advisory: they get the leader's value written
    /// directly, adjusted for their own inversion.
    pub fn unslave(
        &mut self,
        bus: &mut dyn ActuatorBus,
        mode: ControlMode,
    ) -> Result<(), DriverError> {
        if self.control_mode == Some(mode) && !self.is_slaved() {
            return Ok(());
        }
        self.apply_mode(bus, mode, Linkage::Unslaved)
    }

    /// Restore hardware following in the current mode.
    pub fn slave(&mut self, bus: &mut dyn ActuatorBus) -> Result<(), DriverError> {
        let mode = self.control_mode.unwrap_or(ControlMode::PercentOutput);
        self.set_control_mode(bus, mode)
    }

    fn apply_mode(
        &mut self,
        bus: &mut dyn ActuatorBus,
        mode: ControlMode,
        linkage: Linkage,
    ) -> Result<(), DriverError> {
        debug!(side = %self.side, ?mode, ?linkage, "switching motor group mode");
        // forget the old mode first so a partial failure is never debounced
        self.control_mode = None;
        bus.set_control_mode(self.leader.id, mode)?;
        for follower in &self.followers {
            bus.set_control_mode(follower.id, mode)?;
            if linkage == Linkage::Slaved {
                bus.follow(follower.id, self.leader.id, follower.inverted)?;
            }
        }
        self.control_mode = Some(mode);
        self.linkage = linkage;
        self.leader_command = match mode {
            ControlMode::Position => self.leader_command,
            _ => 0.0,
        };
        Ok(())
    }

    /// Write `value` to the leader in the group's current mode.
    ///
    /// Percent output is clamped to [-1, 1]. Non-finite values become a
    /// zero command.
    pub fn issue_command(
        &mut self,
        bus: &mut dyn ActuatorBus,
        value: f64,
    ) -> Result<(), DriverError> {
        let mode = self
            .control_mode
            .ok_or_else(|| DriverError::CommandRejected {
                device: self.leader.id,
                reason: String::from("no control mode selected"),
            })?;
        let value = sanitize(mode, value, self.side);
        bus.write_command(self.leader.id, mode, value * self.leader.sign())?;
        if !self.is_slaved() {
            for follower in &self.followers {
                let raw = value * self.leader.sign() * follower.sign();
                bus.write_command(follower.id, mode, raw)?;
            }
        }
        self.leader_command = value;
        Ok(())
    }

    /// Leader encoder position in revolutions, corrected for inversion.
    pub fn position(&self, bus: &mut dyn ActuatorBus) -> Result<f64, DriverError> {
        Ok(bus.read_position(self.leader.id)? * self.leader.sign())
    }

    pub fn reset_position(&self, bus: &mut dyn ActuatorBus) -> Result<(), DriverError> {
        for id in self.device_ids() {
            bus.reset_position(id)?;
        }
        Ok(())
    }
}

fn sanitize(mode: ControlMode, value: f64, side: Side) -> f64 {
    if !value.is_finite() {
        warn!(%side, value, "refusing non-finite motor command");
        return 0.0;
    }
    match mode {
        ControlMode::PercentOutput => value.clamp(-1.0, 1.0),
        ControlMode::Position | ControlMode::Velocity => value,
    }
}
