use anyhow::Result;
use clap::{Parser, ValueEnum};
use skidsteer::{
    chassis::ChassisController,
    configuration::{AppConfig, SimConfig},
    driver::simulated::{ScriptedSticks, SimulatedBus, SimulatedHeading},
    logging,
};
use std::{f64::consts::PI, path::PathBuf, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tracing::*;

type SimChassis = ChassisController<SimulatedBus, SimulatedHeading, ScriptedSticks>;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scenario {
    /// Stick driving with a slight turn
    Manual,
    /// Hold a heading while driving forward
    HeadingHold,
    /// Drive a fixed distance
    Distance,
    /// All of the above in sequence
    Tour,
}

#[derive(Parser, Debug)]
#[command(version, about = "Simulated differential drive chassis")]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Scenario::Tour)]
    scenario: Scenario,

    /// Heading the simulated imu starts at, degrees
    #[arg(long, default_value_t = 0.0)]
    initial_heading: f64,

    /// Run as fast as possible instead of in real time
    #[arg(long)]
    fast: bool,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Manual { move_axis: f64, rotate_axis: f64 },
    HeadingHold { setpoint: f64 },
    Distance { distance: f64 },
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct Phase {
    step: Step,
    /// Give up on the phase after this long
    timeout: Duration,
}

impl Phase {
    fn new(step: Step, timeout_secs: f64) -> Self {
        Self {
            step,
            timeout: Duration::from_secs_f64(timeout_secs),
        }
    }
}

fn phases(scenario: Scenario) -> Vec<Phase> {
    let manual = Phase::new(
        Step::Manual {
            move_axis: 0.6,
            rotate_axis: 0.1,
        },
        2.0,
    );
    let heading = Phase::new(Step::HeadingHold { setpoint: 90.0 }, 4.0);
    let distance = Phase::new(Step::Distance { distance: 100.0 }, 6.0);
    let idle = Phase::new(Step::Idle, 0.5);
    match scenario {
        Scenario::Manual => vec![manual, idle],
        Scenario::HeadingHold => vec![heading, idle],
        Scenario::Distance => vec![distance, idle],
        Scenario::Tour => vec![manual, heading, distance, idle],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let app_config = AppConfig::load_config(&args.config)?;
    let chassis_config = app_config.chassis.clone();
    let sim_config = app_config.sim;

    let device_ids: Vec<_> = chassis_config.motors().map(|motor| motor.id).collect();
    let bus = SimulatedBus::new(&device_ids, sim_config.max_revolutions_per_second);
    let imu = SimulatedHeading::new(args.initial_heading.rem_euclid(360.0));
    let mut chassis =
        ChassisController::from_config(&chassis_config, bus, imu, ScriptedSticks::default())?;

    let distance_per_revolution = PI * chassis_config.wheel_diameter;
    let simulation = Simulation {
        config: sim_config,
        distance_per_revolution,
        velocity_bias: chassis_config.default_velocity_bias,
        distance_tolerance: chassis_config.distance.tolerance,
        fast: args.fast,
    };

    tokio::select! {
        result = simulation.run(&mut chassis, phases(args.scenario)) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping chassis");
        }
    }
    chassis.enter_idle()?;
    info!(
        telemetry = %serde_json::to_string(&chassis.telemetry())?,
        "Simulation finished"
    );
    Ok(())
}

struct Simulation {
    config: SimConfig,
    distance_per_revolution: f64,
    velocity_bias: f64,
    distance_tolerance: f64,
    fast: bool,
}

impl Simulation {
    async fn run(&self, chassis: &mut SimChassis, phases: Vec<Phase>) -> Result<()> {
        let period = Duration::from_millis(self.config.control_period_ms);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        for phase in phases {
            info!(step = ?phase.step, "Starting phase");
            self.enter(chassis, phase.step)?;
            let ticks = (phase.timeout.as_secs_f64() / period.as_secs_f64()).ceil() as usize;
            let mut finished = false;
            for tick in 0..ticks {
                if !self.fast {
                    ticker.tick().await;
                }
                if let Err(err) = chassis.tick() {
                    error!(%err, "Chassis tick failed");
                    return Err(err.into());
                }
                self.step_plant(chassis, period.as_secs_f64())?;

                if tick % 25 == 0 {
                    debug!(telemetry = %serde_json::to_string(&chassis.telemetry())?);
                }
                if self.phase_done(chassis, phase.step)? {
                    finished = true;
                    info!(tick, "Phase reached its target");
                    break;
                }
            }
            if !finished && matches!(phase.step, Step::Distance { .. }) {
                warn!("Distance not reached before timeout");
            }
            info!(
                heading = chassis.current_heading()?,
                setpoint = chassis.heading_setpoint(),
                "Phase done"
            );
        }
        Ok(())
    }

    fn enter(&self, chassis: &mut SimChassis, step: Step) -> Result<()> {
        match step {
            Step::Manual {
                move_axis,
                rotate_axis,
            } => {
                *chassis.stick_input_mut() = ScriptedSticks::new(move_axis, rotate_axis);
                chassis.enter_manual()?;
            }
            Step::HeadingHold { setpoint } => {
                chassis.enter_heading_hold(setpoint, self.velocity_bias)?;
            }
            Step::Distance { distance } => chassis.enter_distance_hold(distance)?,
            Step::Idle => chassis.enter_idle()?,
        }
        Ok(())
    }

    fn phase_done(&self, chassis: &mut SimChassis, step: Step) -> Result<bool> {
        Ok(match step {
            Step::Distance { .. } => chassis
                .is_distance_on_target(self.distance_tolerance)?
                .unwrap_or(false),
            _ => false,
        })
    }

    /// Move the wheels and turn the imu by what the wheels did.
    fn step_plant(&self, chassis: &mut SimChassis, dt: f64) -> Result<()> {
        let (left_before, right_before) = chassis.side_positions()?;
        chassis.bus_mut().step(dt);
        let (left_after, right_after) = chassis.side_positions()?;
        chassis.heading_sensor_mut().integrate(
            left_after - left_before,
            right_after - right_before,
            self.distance_per_revolution,
            self.config.track_width,
        );
        Ok(())
    }
}
