//! Autolevel Settings Crate
//!
//! Machine, grid and leveling defaults, loaded from a JSON or TOML file.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, GridSettings, LevelingSettings, OutputSettings, ProbingSettings,
};
pub use error::{Result, SettingsError};
