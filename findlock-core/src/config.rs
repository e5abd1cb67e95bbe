//! Configuration loading from findlock.toml.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "findlock.toml";

/// Main configuration structure for findlock.toml.
#[derive(Debug, Deserialize, Default)]
pub struct FindlockConfig {
    /// Extra state substrings that mark a goroutine as waiting on a lock.
    pub wait_states: Option<Vec<String>>,
    /// Extra rules recognising lock-acquire frames.
    pub lock_frames: Option<Vec<LockFrameConfig>>,
    /// Drop the built-in recognition rules instead of extending them.
    #[serde(default)]
    pub replace_defaults: bool,
    /// Output configuration.
    pub output: Option<OutputConfig>,
}

/// One lock-acquire frame rule; both fields are regular expressions.
#[derive(Debug, Deserialize, Clone)]
pub struct LockFrameConfig {
    /// Matched against the frame's function name.
    pub function: String,
    /// Matched against the frame's source file.
    pub file: String,
}

/// Output format configuration.
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    /// Output format: "plain" or "json".
    pub format: Option<String>,
    /// ANSI colors in plain output.
    pub color: Option<bool>,
}

impl OutputConfig {
    pub fn wants_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// Loads configuration from `dir/findlock.toml` if it exists.
pub fn load_config(dir: &Path) -> Result<Option<FindlockConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Loads configuration from an explicit file.
pub fn load_config_file(path: &Path) -> Result<FindlockConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let cfg = toml::from_str(&content)
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(cfg)
}
