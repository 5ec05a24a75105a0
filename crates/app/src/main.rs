use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use workcell_core::{CellConfig, Choreographer, FrameSink, JsonLinesSink, SelectionMode, TraceSink};

fn main() -> workcell_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            mode,
            actors,
            cycles,
            fps,
            speed,
            json,
        } => {
            let mut cell = load_config(config.as_deref())?;
            if let Some(mode) = mode {
                cell.actors.mode = mode;
            }
            if let Some(actors) = actors {
                cell.actors.count = actors;
            }
            let options = RunOptions { cycles, fps, speed };
            if json {
                let stdout = std::io::stdout().lock();
                run(cell, options, &mut JsonLinesSink::new(stdout))
            } else {
                run(cell, options, &mut TraceSink::new())
            }
        }
        Commands::Validate { config } => validate(&config),
        Commands::Defaults { dual } => {
            let config = if dual {
                CellConfig::dual_defaults()
            } else {
                CellConfig::default()
            };
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

struct RunOptions {
    cycles: u64,
    fps: u32,
    speed: f64,
}

fn run(
    config: CellConfig,
    options: RunOptions,
    sink: &mut dyn FrameSink,
) -> workcell_core::Result<()> {
    let mut engine = Choreographer::new(config)?;
    engine.set_speed(options.speed);

    let delta = 1.0 / f64::from(options.fps.max(1));
    tracing::info!(
        cycles = options.cycles,
        fps = options.fps,
        speed = options.speed,
        "running headless"
    );

    let mut events = 0usize;
    loop {
        let frame = engine.tick(delta)?;
        events += engine.take_events().len();
        sink.present(&frame)?;
        if frame.cycle_index >= options.cycles || frame.speed == 0.0 {
            break;
        }
    }
    sink.finish()?;

    let counters = engine.counters();
    tracing::info!(
        cycles = counters.cycles_completed,
        spawned = counters.spawned,
        transformed = counters.transformed,
        placed = counters.placed,
        evicted = counters.evicted,
        events,
        "run complete"
    );
    Ok(())
}

fn validate(path: &Path) -> workcell_core::Result<()> {
    let config = CellConfig::load(path)?;
    config.validate()?;
    tracing::info!(?path, phases = config.phases.len(), "configuration is valid");
    Ok(())
}

fn load_config(path: Option<&Path>) -> workcell_core::Result<CellConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            CellConfig::load(path)
        }
        None => Ok(CellConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Pick-process-place work cell choreography", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine headless for a number of cycles.
    Run {
        /// JSON configuration file. Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Selection mode: fixed-left, fixed-right, alternate or dual.
        #[arg(short, long)]
        mode: Option<SelectionMode>,
        /// Number of actors (1 or 2).
        #[arg(short, long)]
        actors: Option<usize>,
        /// Stop once this many cycles have completed.
        #[arg(long, default_value_t = 2)]
        cycles: u64,
        /// Simulated frames per second.
        #[arg(long, default_value_t = 60)]
        fps: u32,
        /// Simulation speed multiplier.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Emit every frame as a JSON line on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Check a configuration file without running it.
    Validate {
        /// Path to the JSON configuration.
        config: PathBuf,
    },
    /// Print the default configuration as JSON.
    Defaults {
        /// Print the two-actor configuration instead.
        #[arg(long)]
        dual: bool,
    },
}
