//! Configuration for the Tessera chunk server.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line, and tolerate missing or unknown fields so older files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, GeneratorKind, RegionSection, StoreBackend, StreamingSection, WorldConfig,
    default_config_dir,
};
pub use error::ConfigError;
