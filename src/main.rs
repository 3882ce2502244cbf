use anyhow::Context;
use clap::Parser;
use lookalike::{pipeline, EntityId, LookalikeConfig, SnapshotStore};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Find lookalikes of a seed set in a population of entities
#[derive(Parser, Debug)]
#[command(name = "lookalike")]
#[command(about = "Seed-set lookalike expansion with MinHash LSH", long_about = None)]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long)]
    config: PathBuf,

    /// JSON array of population rows
    #[arg(short, long)]
    population: PathBuf,

    /// JSON array of seed ids
    #[arg(short, long)]
    seeds: PathBuf,

    /// Neighbors per seed, overriding `query.k`
    #[arg(short)]
    k: Option<usize>,

    /// Directory for index snapshots; an existing snapshot is reused when it
    /// was built from the same population
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Snapshot name inside `--snapshot-dir`
    #[arg(long, default_value = "index")]
    snapshot_name: String,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting lookalike v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LookalikeConfig::from_file(&args.config)?;
    if let Some(k) = args.k {
        config.query.k = k;
        config.validate()?;
    }
    info!(
        num_perm = config.index.num_perm,
        bands = config.index.bands,
        rows = config.index.rows,
        k = config.query.k,
        "Configuration loaded"
    );

    let rows: Vec<Value> = read_json(&args.population)?;
    let seeds: Vec<EntityId> = read_json(&args.seeds)?;
    info!(rows = rows.len(), seeds = seeds.len(), "Inputs read");

    let population = pipeline::load_population(&config, rows)?;

    let engine = match &args.snapshot_dir {
        Some(dir) => {
            let store = SnapshotStore::new(dir)?;
            if store.snapshot_path(&args.snapshot_name).exists() {
                info!("Loading snapshot {:?}", store.snapshot_path(&args.snapshot_name));
                let engine = store.load_engine(&args.snapshot_name, population)?;
                if *engine.config() != config.engine_config() {
                    anyhow::bail!(
                        "Snapshot '{}' was built with a different index configuration",
                        args.snapshot_name
                    );
                }
                engine
            } else {
                let engine = pipeline::build_engine(&config, population)?;
                let description = store.save(&args.snapshot_name, &engine)?;
                info!("Snapshot saved: {} ({} bytes)", description.name, description.size);
                engine
            }
        }
        None => pipeline::build_engine(&config, population)?,
    };

    let report = pipeline::profile(&engine, &seeds, config.query.k, config.saturation())?;
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
