//! Configuration – reads/writes `~/.sonarmap/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use sonarmap_middleware::TopicMap;
use sonarmap_perception::OrientationSource;
use sonarmap_runtime::EngineConfig;

/// Persisted configuration stored in `~/.sonarmap/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Topic carrying absolute positions.
    #[serde(default = "default_pose_topic")]
    pub pose_topic: String,

    /// Topic carrying robot-relative distance readings.
    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,

    /// Topic carrying distance readings already aligned to the world axes.
    #[serde(default = "default_sensor_topic")]
    pub sensor_topic: String,

    /// Topic carrying combined position + heading + distance frames.
    #[serde(default = "default_combined_topic")]
    pub combined_topic: String,

    /// Where the robot heading comes from.
    #[serde(default)]
    pub orientation_source: OrientationSource,

    /// Heading in degrees before the source reports one.
    #[serde(default)]
    pub initial_orientation_deg: f64,

    /// WebSocket port for the live snapshot feed.
    #[serde(default = "default_feed_port")]
    pub feed_port: u16,

    /// Pause between replayed messages, in milliseconds.
    #[serde(default = "default_replay_delay_ms")]
    pub replay_delay_ms: u64,

    /// Bound of the map actor's command queue.
    #[serde(default = "default_actor_capacity")]
    pub actor_capacity: usize,
}

fn default_pose_topic() -> String {
    TopicMap::default().pose
}
fn default_raw_topic() -> String {
    TopicMap::default().raw
}
fn default_sensor_topic() -> String {
    TopicMap::default().sensors
}
fn default_combined_topic() -> String {
    TopicMap::default().combined
}
fn default_feed_port() -> u16 {
    9090
}
fn default_replay_delay_ms() -> u64 {
    200
}
fn default_actor_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pose_topic: default_pose_topic(),
            raw_topic: default_raw_topic(),
            sensor_topic: default_sensor_topic(),
            combined_topic: default_combined_topic(),
            orientation_source: OrientationSource::default(),
            initial_orientation_deg: 0.0,
            feed_port: default_feed_port(),
            replay_delay_ms: default_replay_delay_ms(),
            actor_capacity: default_actor_capacity(),
        }
    }
}

impl Config {
    pub fn topics(&self) -> TopicMap {
        TopicMap {
            pose: self.pose_topic.clone(),
            raw: self.raw_topic.clone(),
            sensors: self.sensor_topic.clone(),
            combined: self.combined_topic.clone(),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            orientation_source: self.orientation_source,
            initial_orientation_deg: self.initial_orientation_deg,
        }
    }
}

/// Return the path to `~/.sonarmap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sonarmap").join("config.toml")
}

/// Load `path` (or the default location), falling back to defaults when the
/// file does not exist.  Environment overrides are applied either way.
pub fn resolve(path: Option<&Path>) -> Result<Config, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    if cfg.actor_capacity == 0 {
        return Err(format!(
            "Invalid config at {}: actor_capacity must be at least 1",
            path.display()
        ));
    }
    Ok(Some(cfg))
}

/// Apply `SONARMAP_*` environment variable overrides to `cfg`.
///
/// Values that fail to parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SONARMAP_POSE_TOPIC` | `pose_topic` |
/// | `SONARMAP_RAW_TOPIC` | `raw_topic` |
/// | `SONARMAP_SENSOR_TOPIC` | `sensor_topic` |
/// | `SONARMAP_COMBINED_TOPIC` | `combined_topic` |
/// | `SONARMAP_ORIENTATION_SOURCE` | `orientation_source` |
/// | `SONARMAP_FEED_PORT` | `feed_port` |
/// | `SONARMAP_REPLAY_DELAY_MS` | `replay_delay_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SONARMAP_POSE_TOPIC") {
        cfg.pose_topic = v;
    }
    if let Ok(v) = std::env::var("SONARMAP_RAW_TOPIC") {
        cfg.raw_topic = v;
    }
    if let Ok(v) = std::env::var("SONARMAP_SENSOR_TOPIC") {
        cfg.sensor_topic = v;
    }
    if let Ok(v) = std::env::var("SONARMAP_COMBINED_TOPIC") {
        cfg.combined_topic = v;
    }
    if let Ok(v) = std::env::var("SONARMAP_ORIENTATION_SOURCE")
        && let Ok(source) = v.parse::<OrientationSource>()
    {
        cfg.orientation_source = source;
    }
    if let Ok(v) = std::env::var("SONARMAP_FEED_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.feed_port = port;
    }
    if let Ok(v) = std::env::var("SONARMAP_REPLAY_DELAY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.replay_delay_ms = ms;
    }
}

/// Save the config to a specific path, creating parent directories.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
