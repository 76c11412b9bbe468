//! # Closed-loop MPC simulation
//!
//! Drives a simulated kinematic bicycle along a reference polynomial with the bicycle
//! MPC, one control cycle per horizon step, and optionally writes per-cycle telemetry
//! to CSV.

mod logger;
mod plant;
mod telemetry;

use std::path::{Path, PathBuf};

use bicycle_mpc::{
    Actuation64, ControlOutput, KinematicBicycle, MpcConfig, MpcController, ReferencePolynomial,
    VehicleState64,
};
use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{debug, info, warn, LevelFilter};
use serde::Deserialize;

use plant::{Plant, Pose};
use telemetry::Telemetry;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Simulation config file.
    #[arg(short, long, default_value = "config/mpc_sim.toml")]
    config: PathBuf,

    /// Number of control cycles, overrides the config.
    #[arg(short = 'n', long)]
    cycles: Option<usize>,

    /// CSV telemetry output, overrides the config.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Minimum log level.
    #[arg(short, long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SimConfig {
    mpc: MpcConfig,
    scenario: Scenario,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Scenario {
    /// World-frame path `y = f(x)`, lowest order coefficient first.
    reference: ReferencePolynomial,
    initial_pose: Pose,
    cycles: usize,
    output: Option<PathBuf>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            reference: ReferencePolynomial::new(vec![0.0, 0.0]),
            initial_pose: Pose::default(),
            cycles: 100,
            output: None,
        }
    }
}

impl SimConfig {
    fn load(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Cannot read the config file {path:?}"))?;
        let config: Self = toml::from_str(&config_str).wrap_err("Cannot parse the config")?;
        config.mpc.validate().wrap_err("Invalid MPC config")?;
        Ok(config)
    }
}

/// Controller and plant closed around one scenario.
struct Simulation {
    mpc: MpcController,
    plant: Plant,
    reference: ReferencePolynomial,
    period: f64,
    braking: f64,
    previous: Actuation64,
    cycles: usize,
    failures: usize,
    abs_cte_sum: f64,
}

/// What happened in one control cycle.
struct Cycle {
    state: VehicleState64,
    applied: Actuation64,
    output: Option<ControlOutput>,
}

impl Simulation {
    fn new(config: &SimConfig) -> Result<Self> {
        let mpc = MpcController::new(&config.mpc).wrap_err("Failed to build the controller")?;
        let plant = Plant::new(
            config.scenario.initial_pose,
            KinematicBicycle::new(config.mpc.vehicle.lf),
            config.mpc.bounds,
        );

        Ok(Self {
            mpc,
            plant,
            reference: config.scenario.reference.clone(),
            period: config.mpc.horizon.dt,
            braking: -config.mpc.bounds.acceleration,
            previous: Actuation64 { delta: 0.0, a: 0.0 },
            cycles: 0,
            failures: 0,
            abs_cte_sum: 0.0,
        })
    }

    /// Observe, plan and advance the plant by one period.
    ///
    /// A failed plan holds the previous steering and brakes.
    fn step(&mut self) -> Cycle {
        let cycle = self.cycles;
        let state = self.plant.observe(&self.reference);
        self.abs_cte_sum += state.cte.abs();

        let output = match self.mpc.step(&state, &self.reference) {
            Ok(output) => {
                debug!(
                    "Cycle {cycle}: delta {:.4}, a {:.4}, cte {:.4}, epsi {:.4}, v {:.2}",
                    output.actuation.delta, output.actuation.a, state.cte, state.epsi, state.v
                );
                Some(output)
            }
            Err(e) => {
                self.failures += 1;
                warn!("Cycle {cycle}: {e}, holding steering and braking");
                None
            }
        };

        let applied = match &output {
            Some(output) => self.plant.saturate(&output.actuation),
            None => Actuation64 {
                delta: self.previous.delta,
                a: self.braking,
            },
        };

        self.plant.advance(&applied, self.period, &self.reference);
        self.previous = applied;
        self.cycles += 1;

        Cycle {
            state,
            applied,
            output,
        }
    }

    fn mean_abs_cte(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.abs_cte_sum / self.cycles as f64
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    logger::logger_init(cli.log_level, cli.log_file.as_deref())
        .wrap_err("Failed to initialise logging")?;

    let config = SimConfig::load(&cli.config)?;
    info!("Loaded config from {:?}", cli.config);
    debug!("{config:#?}");

    let cycles = cli.cycles.unwrap_or(config.scenario.cycles);
    let mut simulation = Simulation::new(&config)?;

    let mut telemetry = match cli.output.or(config.scenario.output) {
        Some(path) => {
            info!("Writing telemetry to {path:?}");
            Some(Telemetry::create(&path).wrap_err_with(|| format!("Cannot create {path:?}"))?)
        }
        None => None,
    };

    for cycle in 0..cycles {
        let time_s = cycle as f64 * simulation.period;
        let Cycle {
            state,
            applied,
            output,
        } = simulation.step();

        if let Some(telemetry) = telemetry.as_mut() {
            telemetry
                .record(cycle, time_s, &state, &applied, output.as_ref())
                .wrap_err("Failed to write telemetry")?;
        }
    }

    if let Some(telemetry) = telemetry.as_mut() {
        telemetry.flush().wrap_err("Failed to write telemetry")?;
    }

    let final_state = simulation.plant.observe(&simulation.reference);
    info!("Simulation complete after {cycles} cycles");
    info!("    Failed cycles: {}", simulation.failures);
    info!("    Mean |cte|: {:.4}", simulation.mean_abs_cte());
    info!(
        "    Final state: x {:.2}, y {:.2}, v {:.2}, cte {:.4}",
        final_state.x, final_state.y, final_state.v, final_state.cte
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/mpc_sim.toml");
        let config = SimConfig::load(&path).unwrap();
        assert!(config.scenario.cycles > 0);
        assert!(config.scenario.reference.is_finite());
    }

    #[test]
    fn scenario_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config.mpc, MpcConfig::default());
        assert_eq!(config.scenario.cycles, 100);
        assert_eq!(config.scenario.initial_pose, Pose::default());
    }

    #[test]
    fn short_closed_loop_tracks_a_straight_road() {
        let mut config = SimConfig::default();
        config.mpc.solver.time_budget_s = 60.0;
        config.scenario.reference = ReferencePolynomial::new(vec![0.5, 0.0]);
        config.scenario.initial_pose = Pose {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
        };

        let mut simulation = Simulation::new(&config).unwrap();
        let initial_cte = simulation.step().state.cte;
        for _ in 0..9 {
            simulation.step();
        }

        let state = simulation.plant.observe(&simulation.reference);
        assert_eq!(simulation.failures, 0);
        assert!(state.cte.abs() < initial_cte.abs(), "cte {}", state.cte);
        assert!(state.v > 10.0);
    }

    #[test]
    fn bundled_scenario_runs_without_failed_cycles() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/mpc_sim.toml");
        let mut config = SimConfig::load(&path).unwrap();
        // Convergence, not speed, is under test in unoptimised builds.
        config.mpc.solver.time_budget_s = 60.0;

        let mut simulation = Simulation::new(&config).unwrap();
        let mut failed = Vec::new();
        for _ in 0..60 {
            let cycle = simulation.step();
            if cycle.output.is_none() {
                failed.push((simulation.cycles - 1, cycle.state.x));
            }
        }

        assert!(failed.is_empty(), "failed cycles (index, x): {failed:?}");
        assert_eq!(simulation.failures, 0);
        assert!(simulation.mean_abs_cte() < 1.0, "mean |cte| {}", simulation.mean_abs_cte());
        let state = simulation.plant.observe(&simulation.reference);
        assert!(state.x > 40.0, "x {}", state.x);
    }
}
