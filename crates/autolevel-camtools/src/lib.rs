//! # Autolevel CAM Tools
//!
//! The numeric and text processing half of surface leveling:
//!
//! - **Probe Grid**: serpentine scan plan over a rectangular area
//! - **Height Surface**: bicubic spline through the probed height map
//! - **Toolpath Leveler**: rewrites G-code moves to follow the surface

pub mod leveler;
pub mod probe_grid;
pub mod surface;

pub use leveler::{
    leveled_file_name, normalize, LevelingOptions, LevelingReport, ToolpathLeveler, DEFAULT_MARKER,
};
pub use probe_grid::{ProbeGridGenerator, ProbeGridParameters, ScanPlan, MAX_PLAN_POINTS};
pub use surface::{BicubicSurface, Surface, SurfaceExtent, MIN_AXIS_SAMPLES};
