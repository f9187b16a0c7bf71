//! Headless Tessera server.
//!
//! Loads `config.ron` (CLI flags override it), opens the chunk store, and runs
//! the region tick loop with a handful of scripted viewers streaming around
//! the spawn point. Run with `cargo run -p tessera-server -- --ticks 200`.

mod settings;
mod sim;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::DVec3;
use tessera_config::{CliArgs, Config, default_config_dir};
use tessera_region::{RegionState, StandardMaterials};
use tessera_voxel::MaterialRegistry;
use tracing::info;

use crate::sim::Simulation;

/// Ticks between scripted edits.
const EDIT_INTERVAL: u64 = 40;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, args: &CliArgs) -> Result<(), Box<dyn Error>> {
    let mut registry = MaterialRegistry::new();
    let materials = StandardMaterials::register(&mut registry)?;
    let store = settings::open_store(config)?;
    let generator = settings::generator(config, materials);
    let mut region = RegionState::new(
        settings::region_config(config.world.seed, &config.region),
        store,
        generator,
        Arc::new(registry),
    );

    let streaming = settings::streaming_config(&config.streaming);
    let spawn = DVec3::new(0.0, 0.0, 40.0);
    let mut sim = Simulation::new(args.viewers, spawn, &streaming, materials.glass, EDIT_INTERVAL);
    info!(
        "Running {} ticks with {} viewers, seed {}",
        args.ticks,
        args.viewers,
        config.world.seed
    );

    let tick_length = Duration::from_secs_f64(1.0 / f64::from(config.world.tick_rate_hz));
    let stats_interval = config.debug.stats_interval_ticks;
    for tick in 0..args.ticks {
        let started = Instant::now();
        region.tick();
        sim.tick(&mut region, tick);

        if stats_interval > 0 && tick % stats_interval == 0 {
            let stats = region.stats();
            info!(
                "Tick {tick}: {} loaded, {} populating, {} unloading, {} dirty, {} columns, {} jobs in flight ({} backlogged)",
                stats.loaded,
                stats.populating,
                stats.unloading,
                stats.dirty,
                stats.columns,
                stats.jobs_in_flight,
                stats.backlog
            );
        }

        if let Some(rest) = tick_length.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    sim.disconnect_all();
    for walker in sim.walkers() {
        let traffic = walker.traffic();
        info!(
            "Viewer {}: {} sends, {} forgets, {} column updates, {} bytes",
            walker.stream().id(),
            traffic.sent,
            traffic.forgotten,
            traffic.column_updates,
            traffic.bytes
        );
    }
    info!("{} scripted edits applied", sim.edits_applied());

    let stats = region.stats();
    let report = region.shutdown();
    info!(
        "Shutdown: {} saved, {} abandoned ({} saves completed, {} failed over the run)",
        report.saved,
        report.abandoned,
        stats.saves_completed,
        stats.saves_failed
    );
    Ok(())
}
