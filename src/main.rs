use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::str::FromStr;

use junction_sim::simulation::{ObstructionKind, SimConfig, SimWorld, SpawnMode};

/// An obstruction given on the command line as `kind:x:z[:length]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct ObstructionArg {
    kind: ObstructionKind,
    x: f32,
    z: f32,
    length: Option<f32>,
}

impl FromStr for ObstructionArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            bail!("expected kind:x:z[:length], got '{}'", s);
        }
        let kind: ObstructionKind = parts[0].parse()?;
        let x: f32 = parts[1]
            .parse()
            .with_context(|| format!("invalid x coordinate '{}'", parts[1]))?;
        let z: f32 = parts[2]
            .parse()
            .with_context(|| format!("invalid z coordinate '{}'", parts[2]))?;
        let length: Option<f32> = parts
            .get(3)
            .map(|l| l.parse::<f32>().with_context(|| format!("invalid length '{}'", l)))
            .transpose()?;
        Ok(Self { kind, x, z, length })
    }
}

#[derive(Parser)]
#[command(name = "junction_sim")]
#[command(about = "Headless four-arm junction traffic simulation")]
struct Cli {
    /// Simulated seconds to run
    #[arg(long, default_value = "120")]
    seconds: f32,

    /// Frame time per step in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace the signals with a roundabout
    #[arg(long)]
    roundabout: bool,

    /// High-load spawning
    #[arg(long)]
    demo: bool,

    /// Re-time the greens from queue lengths every cycle
    #[arg(long)]
    adaptive_signals: bool,

    /// Obstruction as kind:x:z[:length], e.g. barricade:1.75:-40 (repeatable)
    #[arg(long = "obstruction")]
    obstructions: Vec<ObstructionArg>,

    /// Write the final metrics as JSON to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Log a metrics summary every this many simulated seconds
    #[arg(long, default_value = "10")]
    report_every: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if !(cli.delta.is_finite() && cli.delta > 0.0) {
        bail!("--delta must be a positive number of seconds");
    }
    if !(cli.seconds.is_finite() && cli.seconds >= 0.0) {
        bail!("--seconds must be a finite, non-negative number of seconds");
    }

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.roundabout {
        config.roundabout = true;
    }
    if cli.demo {
        config.spawn.mode = SpawnMode::Demo;
    }
    if cli.adaptive_signals {
        config.adaptive_signals = true;
    }

    run_headless(config, &cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(config: SimConfig, cli: &Cli) -> Result<()> {
    info!("=== JUNCTION SIMULATION ===");
    info!(
        "Layout: {}, spawn mode: {:?}, {}s at {}s per step",
        if config.roundabout { "roundabout" } else { "signalized" },
        config.spawn.mode,
        cli.seconds,
        cli.delta
    );

    let mut world = SimWorld::with_config(config);

    for arg in &cli.obstructions {
        let placed = match arg.length {
            Some(length) => world.place_obstruction_with_length(arg.x, arg.z, arg.kind, length),
            None => world.place_obstruction(arg.x, arg.z, arg.kind),
        };
        if let Err(e) = placed {
            warn!("Skipping {} obstruction: {}", arg.kind, e);
        }
    }

    // The world truncates long frames, so count steps by what it actually advances
    let frame = cli.delta.min(world.config().stepping.max_frame_dt);
    if frame < cli.delta {
        warn!(
            "--delta {}s exceeds the {}s frame limit, running {}s steps",
            cli.delta, frame, frame
        );
    }
    let steps = (cli.seconds / frame).ceil() as u64;
    let mut next_report = cli.report_every;
    for _ in 0..steps {
        world.step(cli.delta);
        if cli.report_every > 0.0 && world.time() >= next_report {
            info!("{}", world.metrics().summary());
            next_report += cli.report_every;
        }
    }

    info!("=== SIMULATION COMPLETE ===");
    world.log_summary();

    let metrics = world.metrics();
    info!("Simulated time: {:.1}s", world.time());
    info!("Total vehicles spawned: {}", metrics.total_spawned);
    info!("Total vehicles completed: {}", metrics.completed);
    info!("Active vehicles: {}", metrics.active_vehicles);
    info!("Average wait: {:.1}s", metrics.average_wait);
    info!("Throughput: {:.1} vehicles/min", metrics.throughput_per_minute);
    info!("CO2 emitted: {:.2}kg", metrics.co2_kg);

    if let Some(path) = &cli.export {
        world.write_export(path)?;
    }
    Ok(())
}
