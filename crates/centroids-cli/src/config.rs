//! Node configuration – reads `~/.centroids/config.toml`.
//!
//! ```toml
//! frame_id = "map"
//! log_level = "info"
//! bus_capacity = 256
//!
//! [pipeline]
//! distance_threshold = 0.2
//! eps = 0.3
//! min_samples = 1
//! merge_threshold = 0.5
//! obstacle_threshold = 0.2
//! ```
//!
//! The `[pipeline]` keys have no defaults.

use centroids_runtime::PipelineParams;
use centroids_types::PipelineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Node configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Frame the published centroids are expressed in.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-topic event bus capacity.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    pub pipeline: PipelineParams,
}

fn default_frame_id() -> String {
    "map".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bus_capacity() -> usize {
    256
}

impl Config {
    /// Reject values the node cannot start with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline.validate()?;
        if self.frame_id.trim().is_empty() {
            return Err(PipelineError::Config("frame_id must not be empty".to_string()));
        }
        if self.bus_capacity == 0 {
            return Err(PipelineError::Config("bus_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Return the path to `~/.centroids/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".centroids").join("config.toml")
}

/// Load, override from the process environment, and validate.
pub fn load_from(path: &Path) -> Result<Config, PipelineError> {
    load_with(path, |key| std::env::var(key).ok())
}

/// [`load_from`] with an explicit environment lookup.
pub(crate) fn load_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, PipelineError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!("Failed to read config at {}: {}", path.display(), e))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
    apply_env_overrides(&mut cfg, env);
    cfg.validate()?;
    Ok(cfg)
}

/// Apply `CENTROIDS_*` overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CENTROIDS_FRAME_ID` | `frame_id` |
/// | `CENTROIDS_LOG_LEVEL` | `log_level` |
/// | `CENTROIDS_BUS_CAPACITY` | `bus_capacity` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("CENTROIDS_FRAME_ID") {
        cfg.frame_id = v;
    }
    if let Some(v) = env("CENTROIDS_LOG_LEVEL") {
        cfg.log_level = v;
    }
    if let Some(v) = env("CENTROIDS_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.bus_capacity = capacity;
    }
}
