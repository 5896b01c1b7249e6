use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use spawnworld_kernel::{SAVE_VERSION, ShapeFactory, Spawner, SpawnerConfig, inspect_header};
use spawnworld_persist::SaveStore;
use spawnworld_stream::{LevelCatalog, ScriptedSceneLoader};

#[derive(Parser)]
#[command(name = "spawnworld-cli", about = "CLI tool for spawnworld populations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Spawner configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Level catalog (JSON); defaults to generated levels
    #[arg(long, global = true)]
    levels: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the current save version
    Info,
    /// Run the spawner headless for a number of ticks
    Simulate {
        /// Number of ticks to run
        #[arg(short, long, default_value = "60")]
        ticks: u32,
        /// Seconds per tick
        #[arg(long, default_value = "0.016")]
        dt: f64,
        /// Entities created per second (overrides config)
        #[arg(long)]
        create: Option<f64>,
        /// Entities destroyed per second (overrides config)
        #[arg(long)]
        destroy: Option<f64>,
        /// Level to switch to before simulating
        #[arg(long)]
        level: Option<i32>,
        /// RNG seed (overrides config)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Write the final population to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Start a new game, load a save file, and report the result
    Load {
        /// Save file to read
        file: PathBuf,
        /// Ticks to run after the level is active
        #[arg(short, long, default_value = "0")]
        ticks: u32,
    },
    /// Print the header of a save file
    Inspect {
        /// Save file to read
        file: PathBuf,
    },
}

type CliSpawner = Spawner<ShapeFactory, ScriptedSceneLoader>;

/// Upper bound on ticks spent waiting for a level transition.
const SETTLE_LIMIT: u32 = 10_000;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("spawnworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("save format: v{SAVE_VERSION}");
            println!("default levels: {}", SpawnerConfig::default().level_count);
        }
        Commands::Simulate {
            ticks,
            dt,
            create,
            destroy,
            level,
            seed,
            save,
        } => {
            let mut config = read_config(cli.config.as_ref())?;
            if let Some(rate) = create {
                config.creation_rate = rate;
            }
            if let Some(rate) = destroy {
                config.destruction_rate = rate;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            let mut spawner = build_spawner(&config, cli.levels.as_ref())?;
            spawner.start()?;
            settle(&mut spawner)?;
            if let Some(level) = level {
                spawner.select_level(level)?;
                settle(&mut spawner)?;
            }

            let step = Duration::try_from_secs_f64(dt)
                .with_context(|| format!("invalid tick length {dt}"))?;
            for _ in 0..ticks {
                spawner.tick(step)?;
            }
            println!(
                "Simulated {ticks} ticks: level={}, entities={}, hash={:#x}",
                spawner.level().0,
                spawner.len(),
                spawner.population_hash()
            );

            if let Some(path) = save {
                let store = SaveStore::new(&path);
                let bytes = spawner.save_to(&store)?;
                println!("Saved {bytes} bytes to {}", path.display());
            }
        }
        Commands::Load { file, ticks } => {
            let config = read_config(cli.config.as_ref())?;
            let mut spawner = build_spawner(&config, cli.levels.as_ref())?;
            spawner.start()?;
            settle(&mut spawner)?;

            let store = SaveStore::new(&file);
            spawner
                .load_from(&store)
                .with_context(|| format!("loading {}", file.display()))?;
            settle(&mut spawner)?;
            println!(
                "Loaded: level={}, entities={}, hash={:#x}",
                spawner.level().0,
                spawner.len(),
                spawner.population_hash()
            );

            let step = Duration::from_secs_f64(1.0 / 60.0);
            for _ in 0..ticks {
                spawner.tick(step)?;
            }
            if ticks > 0 {
                println!("After {ticks} ticks: entities={}", spawner.len());
            }
        }
        Commands::Inspect { file } => {
            let bytes = SaveStore::new(&file)
                .read_bytes()
                .with_context(|| format!("reading {}", file.display()))?;
            let header = inspect_header(&bytes)?;
            println!(
                "{}: version={}, level={}, entities={}, bytes={}",
                file.display(),
                header.version,
                header.level.0,
                header.count,
                bytes.len()
            );
        }
    }

    Ok(())
}

fn read_config(path: Option<&PathBuf>) -> anyhow::Result<SpawnerConfig> {
    let Some(path) = path else {
        return Ok(SpawnerConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(SpawnerConfig::from_json(&json)?)
}

fn build_spawner(config: &SpawnerConfig, levels: Option<&PathBuf>) -> anyhow::Result<CliSpawner> {
    let catalog = match levels {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading level catalog {}", path.display()))?;
            LevelCatalog::from_json(&json)?
        }
        None => LevelCatalog::generated(config.level_count as usize, 2),
    };
    if catalog.len() < config.level_count as usize {
        anyhow::bail!(
            "level catalog has {} levels, config expects {}",
            catalog.len(),
            config.level_count
        );
    }
    let factory = ShapeFactory::new(config.kind_count, config.variant_count, config.recycle);
    Ok(Spawner::new(config, factory, ScriptedSceneLoader::new(catalog))?)
}

/// Tick with zero elapsed time until any in-flight level transition finishes.
fn settle(spawner: &mut CliSpawner) -> anyhow::Result<()> {
    let mut ticks = 0;
    while spawner.is_transitioning() {
        if ticks == SETTLE_LIMIT {
            anyhow::bail!("level transition did not finish after {SETTLE_LIMIT} ticks");
        }
        spawner.tick(Duration::ZERO)?;
        ticks += 1;
    }
    tracing::debug!(ticks, level = spawner.level().0, "level settled");
    Ok(())
}
