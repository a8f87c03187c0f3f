//! # Autolevel
//!
//! Surface probing and G-code leveling for GRBL controlled mills, used to
//! cut PCBs and thin stock that is not perfectly flat.
//!
//! ## Architecture
//!
//! Autolevel is organized as a workspace with multiple crates:
//!
//! 1. **autolevel-core** - Error types, coordinates, height map
//! 2. **autolevel-communication** - Serial transport, GRBL probing session
//! 3. **autolevel-camtools** - Probe grid, height surface, toolpath leveler
//! 4. **autolevel-settings** - Configuration file handling and defaults
//! 5. **autolevel** - Pipeline orchestration and the command line tool
//!
//! A run generates a serpentine probe grid, probes every point relative to
//! the origin, fits a bicubic surface through the heights and optionally
//! rewrites a G-code file to follow that surface.

pub mod pipeline;
pub mod table;

pub use autolevel_camtools::{
    leveled_file_name, BicubicSurface, LevelingOptions, LevelingReport, ProbeGridGenerator,
    ProbeGridParameters, ScanPlan, Surface, SurfaceExtent, ToolpathLeveler,
};
pub use autolevel_communication::{
    list_ports, ConnectionParams, ProbeSession, ProbeSessionConfig, SerialTransport, Transport,
};
pub use autolevel_core::{Coordinate, Error, HeightMap, HeightSample, Result};
pub use autolevel_settings::Config;
pub use pipeline::{LevelingJob, Pipeline, PipelineOutcome};
pub use table::format_height_table;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, so stdout carries only the program's own results
/// - RUST_LOG environment variable support, INFO when unset
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
