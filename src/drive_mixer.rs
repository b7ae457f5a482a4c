use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SideCommand {
    left: f64,
    right: f64,
}

impl SideCommand {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn stopped() -> Self {
        Self::default()
    }

    /// Arcade mix of a forward and a rotation command.
    ///
    /// Positive rotation drives the left side harder. Each side is clamped
    /// to [-1, 1]; shaping the stick input is up to the caller.
    pub fn from_arcade(move_cmd: f64, rotate_cmd: f64, speed_scale: f64) -> Self {
        let forward = move_cmd * speed_scale;
        Self {
            left: (forward + rotate_cmd).clamp(-1.0, 1.0),
            right: (forward - rotate_cmd).clamp(-1.0, 1.0),
        }
    }

    pub fn left(&self) -> f64 {
        self.left
    }

    pub fn right(&self) -> f64 {
        self.right
    }
}

pub fn mix(move_cmd: f64, rotate_cmd: f64, speed_scale: f64) -> (f64, f64) {
    let command = SideCommand::from_arcade(move_cmd, rotate_cmd, speed_scale);
    (command.left(), command.right())
}
