//! Command-line argument parsing for the Tessera server.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, StoreBackend};

/// Tessera server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Voxel chunk streaming server")]
pub struct CliArgs {
    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory store root.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Keep chunk records in memory only.
    #[arg(long)]
    pub memory_store: bool,

    /// Background worker threads.
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Radius of the full-detail tier, in chunks.
    #[arg(long)]
    pub tier1_radius: Option<u32>,

    /// Tier-weighted dispatch budget per viewer tick.
    #[arg(long)]
    pub dispatch_budget: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ticks to run before shutting down.
    #[arg(long, default_value_t = 600)]
    pub ticks: u64,

    /// Number of simulated viewers.
    #[arg(long, default_value_t = 2)]
    pub viewers: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(ref dir) = args.store_dir {
            self.world.store_dir = dir.clone();
            self.world.store = StoreBackend::Directory;
        }
        if args.memory_store {
            self.world.store = StoreBackend::Memory;
        }
        if let Some(threads) = args.worker_threads {
            self.region.worker_threads = threads;
        }
        if let Some(radius) = args.tier1_radius {
            let radii = &mut self.streaming.tier_radii;
            radii[0] = radius;
            // Keep the bands nested.
            for i in 1..radii.len() {
                radii[i] = radii[i].max(radii[i - 1]);
            }
        }
        if let Some(budget) = args.dispatch_budget {
            self.streaming.dispatch_budget = budget;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            seed: Some(99),
            store_dir: Some(PathBuf::from("/tmp/w")),
            dispatch_budget: Some(64),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.seed, 99);
        assert_eq!(config.world.store_dir, PathBuf::from("/tmp/w"));
        assert_eq!(config.streaming.dispatch_budget, 64);
        // Non-overridden fields retain defaults
        assert_eq!(config.region.lock_buckets, 16);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_memory_store_flag_wins() {
        let mut config = Config::default();
        let args = CliArgs {
            store_dir: Some(PathBuf::from("ignored")),
            memory_store: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.store, StoreBackend::Memory);
    }

    #[test]
    fn test_large_tier1_radius_keeps_bands_nested() {
        let mut config = Config::default();
        let args = CliArgs {
            tier1_radius: Some(12),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.streaming.tier_radii, [12, 12, 12, 14, 24]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_flags() {
        let args = CliArgs::parse_from(["tessera", "--seed", "5", "--memory-store", "--ticks", "10"]);
        assert_eq!(args.seed, Some(5));
        assert!(args.memory_store);
        assert_eq!(args.ticks, 10);
        assert_eq!(args.viewers, 2);
    }
}
