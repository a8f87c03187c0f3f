//! Configuration for autolevel
//!
//! Holds every machine and process default in one structure so the core
//! crates can take explicit parameters. Supports JSON and TOML files; the
//! default location is `<config dir>/autolevel/config.toml`.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, timeouts)
//! - Grid defaults (probe spacing)
//! - Probing motion (clearance and probe moves)
//! - Leveling (mill depth, output naming)
//! - Output (height log location)

use crate::error::{Result, SettingsError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port of the controller
    pub port: String,
    /// Baud rate for the serial connection
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Longest wait for a probe reply in milliseconds
    pub reply_timeout_ms: u64,
    /// Log the controller greeting before unlocking
    pub startup_drain: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 500,
            reply_timeout_ms: 120_000,
            startup_drain: true,
        }
    }
}

/// Default probe spacing, used when a run does not give its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub step_x: f64,
    pub step_y: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            step_x: -10.0,
            step_y: 10.0,
        }
    }
}

/// Probe motion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbingSettings {
    /// Retract height between points (mm)
    pub clearance_z: f64,
    /// Retract feed rate (mm/min)
    pub clearance_feed: f64,
    /// Lowest Z the probe travels to (mm)
    pub probe_target_z: f64,
    /// Probe feed rate (mm/min)
    pub probe_feed: f64,
}

impl Default for ProbingSettings {
    fn default() -> Self {
        Self {
            clearance_z: 1.0,
            clearance_feed: 95.0,
            probe_target_z: -20.0,
            probe_feed: 30.0,
        }
    }
}

/// Toolpath leveling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelingSettings {
    /// Cut depth below the probed surface (mm)
    pub mill_depth: f64,
    /// Inserted before the extension of leveled files
    pub output_marker: String,
    /// Reject moves whose numbers do not parse
    pub strict: bool,
}

impl Default for LevelingSettings {
    fn default() -> Self {
        Self {
            mill_depth: 0.1,
            output_marker: ".LEV".to_string(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Tab separated `x y height` log written during probing
    pub height_log: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            height_log: PathBuf::from("height_map.txt"),
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
/// Sections missing from a file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub grid: GridSettings,
    pub probing: ProbingSettings,
    pub leveling: LevelingSettings,
    pub output: OutputSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(SettingsError::UnsupportedFormat(
            path.display().to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location, if the platform has a config directory
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autolevel").join("config.toml"))
    }

    /// Load the config from [`Config::config_path`], or defaults when absent
    pub fn load_or_default() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.is_file() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load_from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.port.trim().is_empty() {
            return Err(SettingsError::invalid("connection.port", "must not be empty"));
        }
        if c.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if c.read_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.read_timeout_ms", "must be > 0"));
        }
        if c.reply_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.reply_timeout_ms", "must be > 0"));
        }

        for (key, step) in [("grid.step_x", self.grid.step_x), ("grid.step_y", self.grid.step_y)] {
            if !step.is_finite() || step == 0.0 {
                return Err(SettingsError::invalid(key, "must be a non-zero number"));
            }
        }

        let p = &self.probing;
        if !p.clearance_z.is_finite() || !p.probe_target_z.is_finite() {
            return Err(SettingsError::invalid("probing", "heights must be finite"));
        }
        if p.probe_target_z >= p.clearance_z {
            return Err(SettingsError::invalid(
                "probing.probe_target_z",
                "must be below clearance_z",
            ));
        }
        for (key, feed) in [
            ("probing.clearance_feed", p.clearance_feed),
            ("probing.probe_feed", p.probe_feed),
        ] {
            if !(feed.is_finite() && feed > 0.0) {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        let l = &self.leveling;
        if !(l.mill_depth.is_finite() && l.mill_depth >= 0.0) {
            return Err(SettingsError::invalid("leveling.mill_depth", "must be >= 0"));
        }
        if l.output_marker.is_empty() || l.output_marker.contains(['/', '\\']) {
            return Err(SettingsError::invalid(
                "leveling.output_marker",
                "must be non-empty and contain no path separator",
            ));
        }

        if self.output.height_log.as_os_str().is_empty() {
            return Err(SettingsError::invalid("output.height_log", "must not be empty"));
        }

        Ok(())
    }
}
