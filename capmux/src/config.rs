//! On-disk host configuration: which plugin executables to spawn and
//! what frame-size limits to offer them. Reads `config.toml` from a
//! resolvable config directory, writing a default file on first run
//! rather than failing.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One configured plugin: its executable path, and an optional hint of the
/// capabilities it's expected to advertise, used for cold-start routing
/// before the plugin is actually spawned and attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub known_caps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Plugin executables this host spawns on startup.
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginConfig>,
    #[serde(default = "default_max_frame")]
    pub max_frame: u64,
    #[serde(default = "default_max_chunk")]
    pub max_chunk: u64,
}

fn default_max_frame() -> u64 {
    protocol::Limits::DEFAULT.max_frame
}

fn default_max_chunk() -> u64 {
    protocol::Limits::DEFAULT.max_chunk
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            max_frame: default_max_frame(),
            max_chunk: default_max_chunk(),
        }
    }
}

impl HostConfig {
    pub fn limits(&self) -> protocol::Limits {
        protocol::Limits {
            max_frame: self.max_frame,
            max_chunk: self.max_chunk,
        }
    }
}

/// Loads `config.toml` from `config_path`, or from the default config
/// directory if `config_path` is `None`. Writes a default file on first
/// run; a missing or malformed file otherwise falls back to defaults
/// rather than failing the whole process.
pub fn load_with_override(config_path: Option<&Path>) -> HostConfig {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let default = HostConfig::default();
        if let Ok(toml_str) = toml::to_string_pretty(&default) {
            let _ = fs::write(&path, toml_str);
        }
        return default;
    }

    let mut file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(_) => return HostConfig::default(),
    };
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_err() {
        return HostConfig::default();
    }

    toml::from_str(&contents).unwrap_or_default()
}

fn default_config_path() -> PathBuf {
    let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join("capmux").join("config.toml")
}
