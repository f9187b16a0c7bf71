//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World identity and persistence.
    pub world: WorldConfig,
    /// Chunk residency, saving, and worker settings.
    pub region: RegionSection,
    /// Per-viewer streaming settings.
    pub streaming: StreamingSection,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Where chunk records are kept.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoreBackend {
    /// Records live in memory and vanish on exit.
    Memory,
    /// One file per record under `store_dir`.
    #[default]
    Directory,
}

/// Which terrain generator fills new chunks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Noise-driven hills with water.
    #[default]
    Layered,
    /// Level ground at `flat_ground_height`.
    Flat,
}

/// World configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed handed to the terrain generator.
    pub seed: u64,
    pub store: StoreBackend,
    /// Root of the directory store. Relative paths resolve against the
    /// working directory.
    pub store_dir: PathBuf,
    pub generator: GeneratorKind,
    /// Ground height for the flat generator, in blocks.
    pub flat_ground_height: i64,
    /// Simulation ticks per second.
    pub tick_rate_hz: u32,
}

/// Region configuration. Mirrors the region's own tuning struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionSection {
    /// Background worker threads (0 = CPU count minus two).
    pub worker_threads: usize,
    pub lock_buckets: usize,
    /// Idle ticks before a chunk is unloaded.
    pub unload_after_ticks: u64,
    /// Dirty ticks before a chunk is saved in place.
    pub autosave_after_ticks: u64,
    pub unload_save_timeout_ticks: u64,
    pub load_wait_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub late_fixup_capacity: usize,
    pub late_fixups_per_tick: usize,
    pub job_queue_capacity: usize,
}

/// Streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingSection {
    /// Chebyshev radius of each tier band, finest first.
    pub tier_radii: [u32; 5],
    /// Payload cost of each tier, finest first.
    pub tier_costs: [u32; 5],
    /// Tier-weighted cost a viewer may dispatch per tick.
    pub dispatch_budget: u32,
    /// Frontier nodes a viewer may visit per tick.
    pub visit_budget: u32,
    pub degrade_forget_steps: usize,
    pub frustum_culling: bool,
    /// Full field of view in degrees.
    pub fov_degrees: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Ticks between region stats log lines (0 = never).
    pub stats_interval_ticks: u64,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            store: StoreBackend::default(),
            store_dir: PathBuf::from("world"),
            generator: GeneratorKind::default(),
            flat_ground_height: 16,
            tick_rate_hz: 20,
        }
    }
}

impl Default for RegionSection {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            lock_buckets: 16,
            unload_after_ticks: 600,
            autosave_after_ticks: 1200,
            unload_save_timeout_ticks: 200,
            load_wait_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            late_fixup_capacity: 256,
            late_fixups_per_tick: 16,
            job_queue_capacity: 256,
        }
    }
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            tier_radii: [3, 6, 10, 14, 24],
            tier_costs: [16, 4, 2, 1, 1],
            dispatch_budget: 256,
            visit_budget: 20_000,
            degrade_forget_steps: 2,
            frustum_culling: false,
            fov_degrees: 110.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval_ticks: 100,
        }
    }
}

/// Platform config directory for Tessera, e.g. `~/.config/tessera`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radii = self.streaming.tier_radii;
        if radii.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ConfigError::Invalid(format!(
                "tier radii must not shrink toward coarser tiers: {radii:?}"
            )));
        }
        if self.streaming.tier_costs.contains(&0) {
            return Err(ConfigError::Invalid("tier costs must be positive".into()));
        }
        if self.streaming.dispatch_budget == 0 || self.streaming.visit_budget == 0 {
            return Err(ConfigError::Invalid("streaming budgets must be positive".into()));
        }
        if self.world.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".into()));
        }
        if self.region.lock_buckets == 0 {
            return Err(ConfigError::Invalid("lock_buckets must be positive".into()));
        }
        if self.region.job_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "job_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("dispatch_budget: 256"));
        assert!(ron_str.contains("store: Directory"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.world.seed = 42;
        config.streaming.frustum_culling = true;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(world: (seed: 7))").unwrap();
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.world.store_dir, PathBuf::from("world"));
        assert_eq!(config.streaming, StreamingSection::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.world.store = StoreBackend::Memory;
        config.region.worker_threads = 3;
        config.streaming.tier_radii = [1, 2, 3, 4, 5];

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.streaming.dispatch_budget = 64;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().streaming.dispatch_budget, 64);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_shrinking_radii_rejected() {
        let mut config = Config::default();
        config.streaming.tier_radii = [4, 3, 10, 14, 24];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_cost_rejected() {
        let mut config = Config::default();
        config.streaming.tier_costs[2] = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
