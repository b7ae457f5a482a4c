use super::{ActuatorBus, ControlMode, DeviceId, DriverError, HeadingSensor, StickInput};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusEvent {
    ModeSet {
        device: DeviceId,
        mode: ControlMode,
    },
    Command {
        device: DeviceId,
        mode: ControlMode,
        value: f64,
    },
    Follow {
        device: DeviceId,
        leader: DeviceId,
        inverted: bool,
    },
    PositionReset {
        device: DeviceId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub mode: ControlMode,
    /// `(leader, inverted)` while mirroring another device
    pub following: Option<(DeviceId, bool)>,
    pub command: f64,
    /// Raw encoder position in revolutions
    pub position: f64,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            mode: ControlMode::PercentOutput,
            following: None,
            command: 0.0,
            position: 0.0,
        }
    }
}

/// In-memory motor controller bus with a first order plant.
///
/// Full percent output turns a wheel at `max_revolutions_per_second`.
/// Position mode slews towards the target at the same rate.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    devices: BTreeMap<DeviceId, SimulatedDevice>,
    unreachable: BTreeSet<DeviceId>,
    events: Vec<BusEvent>,
    max_revolutions_per_second: f64,
}

impl SimulatedBus {
    pub fn new(device_ids: &[DeviceId], max_revolutions_per_second: f64) -> Self {
        Self {
            devices: device_ids
                .iter()
                .map(|id| (*id, SimulatedDevice::default()))
                .collect(),
            unreachable: BTreeSet::new(),
            events: vec![],
            max_revolutions_per_second,
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<&SimulatedDevice> {
        self.devices.get(&id)
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Simulate a device dropping off (or coming back to) the bus.
    pub fn set_unreachable(&mut self, id: DeviceId, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(id);
        } else {
            self.unreachable.remove(&id);
        }
    }

    pub fn set_position(&mut self, id: DeviceId, position: f64) {
        if let Some(device) = self.devices.get_mut(&id) {
            device.position = position;
        }
    }

    /// Output the device is actually producing, following chains resolved.
    pub fn effective_output(&self, id: DeviceId) -> Option<f64> {
        let mut sign = 1.0;
        let mut current = id;
        // chains longer than the number of devices can only be loops
        for _ in 0..=self.devices.len() {
            let device = self.devices.get(&current)?;
            match device.following {
                Some((leader, inverted)) => {
                    if inverted {
                        sign = -sign;
                    }
                    current = leader;
                }
                None => return Some(device.command * sign),
            }
        }
        None
    }

    /// Advance the plant by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let max_step = self.max_revolutions_per_second * dt;
        let ids: Vec<DeviceId> = self.devices.keys().copied().collect();
        let mut deltas = BTreeMap::new();
        for id in &ids {
            let device = &self.devices[id];
            if device.following.is_some() {
                continue;
            }
            let delta = match device.mode {
                ControlMode::PercentOutput => device.command.clamp(-1.0, 1.0) * max_step,
                ControlMode::Velocity => (device.command * dt).clamp(-max_step, max_step),
                ControlMode::Position => {
                    (device.command - device.position).clamp(-max_step, max_step)
                }
            };
            deltas.insert(*id, delta);
        }
        for id in &ids {
            let delta = match self.devices[id].following {
                Some((leader, inverted)) => {
                    let leader_delta = deltas.get(&leader).copied().unwrap_or_default();
                    if inverted {
                        -leader_delta
                    } else {
                        leader_delta
                    }
                }
                None => deltas[id],
            };
            if let Some(device) = self.devices.get_mut(id) {
                device.position += delta;
            }
        }
    }

    fn reachable_device(&mut self, id: DeviceId) -> Result<&mut SimulatedDevice, DriverError> {
        if self.unreachable.contains(&id) {
            return Err(DriverError::DeviceUnreachable(id));
        }
        self.devices
            .get_mut(&id)
            .ok_or(DriverError::DeviceUnreachable(id))
    }
}

impl ActuatorBus for SimulatedBus {
    fn set_control_mode(&mut self, device: DeviceId, mode: ControlMode) -> Result<(), DriverError> {
        let state = self.reachable_device(device)?;
        state.mode = mode;
        state.following = None;
        // position mode holds wherever the wheel currently is
        state.command = match mode {
            ControlMode::Position => state.position,
            _ => 0.0,
        };
        self.events.push(BusEvent::ModeSet { device, mode });
        Ok(())
    }

    fn write_command(
        &mut self,
        device: DeviceId,
        mode: ControlMode,
        value: f64,
    ) -> Result<(), DriverError> {
        let state = self.reachable_device(device)?;
        if let Some((leader, _)) = state.following {
            return Err(DriverError::CommandRejected {
                device,
                reason: format!("device is following {}", leader),
            });
        }
        if state.mode != mode {
            return Err(DriverError::CommandRejected {
                device,
                reason: format!("device is in {:?} mode, command was {:?}", state.mode, mode),
            });
        }
        state.command = value;
        self.events.push(BusEvent::Command {
            device,
            mode,
            value,
        });
        Ok(())
    }

    fn follow(
        &mut self,
        device: DeviceId,
        leader: DeviceId,
        inverted: bool,
    ) -> Result<(), DriverError> {
        if !self.devices.contains_key(&leader) {
            return Err(DriverError::DeviceUnreachable(leader));
        }
        let state = self.reachable_device(device)?;
        state.following = Some((leader, inverted));
        self.events.push(BusEvent::Follow {
            device,
            leader,
            inverted,
        });
        Ok(())
    }

    fn read_position(&mut self, device: DeviceId) -> Result<f64, DriverError> {
        Ok(self.reachable_device(device)?.position)
    }

    fn reset_position(&mut self, device: DeviceId) -> Result<(), DriverError> {
        self.reachable_device(device)?.position = 0.0;
        self.events.push(BusEvent::PositionReset { device });
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedHeading {
    pub heading: f64,
    pub failed: bool,
}

impl SimulatedHeading {
    pub fn new(heading: f64) -> Self {
        Self {
            heading,
            failed: false,
        }
    }

    /// Integrate a turn from the travel of each side (revolutions).
    ///
    /// Heading grows when the right side covers more ground than the left.
    pub fn integrate(
        &mut self,
        left_revolutions: f64,
        right_revolutions: f64,
        distance_per_revolution: f64,
        track_width: f64,
    ) {
        let arc = (right_revolutions - left_revolutions) * distance_per_revolution;
        let turn = (arc / track_width).to_degrees();
        self.heading = (self.heading + turn).rem_euclid(360.0);
    }
}

impl HeadingSensor for SimulatedHeading {
    fn read_heading(&mut self) -> Result<f64, DriverError> {
        if self.failed {
            Err(DriverError::SensorReadFailed(String::from("imu not responding")))
        } else {
            Ok(self.heading)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedSticks {
    pub move_axis: f64,
    pub rotate_axis: f64,
}

impl ScriptedSticks {
    pub fn new(move_axis: f64, rotate_axis: f64) -> Self {
        Self {
            move_axis,
            rotate_axis,
        }
    }
}

impl StickInput for ScriptedSticks {
    fn read_stick_axes(&mut self) -> (f64, f64) {
        (self.move_axis, self.rotate_axis)
    }
}
