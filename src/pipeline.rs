//! Leveling run orchestration
//!
//! Runs the stages strictly in order: scan plan, input checks, controller
//! connection, probing, surface fit, leveling. Everything that can be checked
//! without the machine is checked before the transport is opened, and a
//! failed probe session never reaches the surface fit.
//!
//! Heights go to `<height log>.partial` while probing. The file replaces the
//! height log only once every point has been probed, so a run that fails
//! leaves the previous log in place.

use autolevel_camtools::{
    leveled_file_name, BicubicSurface, LevelingOptions, LevelingReport, ProbeGridGenerator,
    ProbeGridParameters, ScanPlan, ToolpathLeveler, MIN_AXIS_SAMPLES,
};
use autolevel_communication::{ConnectionParams, ProbeSession, ProbeSessionConfig, Transport};
use autolevel_core::{HeightMap, Result, SurfaceError, ToolpathError};
use autolevel_settings::Config;
use std::fs::{self, File};
use std::ffi::OsString;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One probing (and optionally leveling) request
#[derive(Debug, Clone, PartialEq)]
pub struct LevelingJob {
    /// Probed area along X (mm)
    pub width: f64,
    /// Probed area along Y (mm)
    pub height: f64,
    pub step_x: f64,
    pub step_y: f64,
    /// Cut depth below the surface (mm)
    pub mill_depth: f64,
    /// G-code file to level; probing only when `None`
    pub input: Option<PathBuf>,
}

impl LevelingJob {
    /// Job over a `width` x `height` area with steps and depth from `config`
    pub fn new(width: f64, height: f64, config: &Config) -> Self {
        Self {
            width,
            height,
            step_x: config.grid.step_x,
            step_y: config.grid.step_y,
            mill_depth: config.leveling.mill_depth,
            input: None,
        }
    }

    pub fn with_steps(mut self, step_x: f64, step_y: f64) -> Self {
        self.step_x = step_x;
        self.step_y = step_y;
        self
    }

    pub fn with_mill_depth(mut self, mill_depth: f64) -> Self {
        self.mill_depth = mill_depth;
        self
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    fn grid(&self) -> ProbeGridParameters {
        ProbeGridParameters {
            width: self.width,
            height: self.height,
            step_x: self.step_x,
            step_y: self.step_y,
        }
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub plan: ScanPlan,
    pub height_map: HeightMap,
    /// `None` when a probe-only grid is too small to interpolate
    pub surface: Option<BicubicSurface>,
    /// Leveled file and what changed in it, when an input was given
    pub leveled: Option<(PathBuf, LevelingReport)>,
}

/// Sequences a leveling run with one configuration
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serial parameters for the configured controller
    pub fn connection_params(&self) -> ConnectionParams {
        let c = &self.config.connection;
        ConnectionParams::serial(c.port.clone(), c.baud_rate).with_read_timeout(c.read_timeout_ms)
    }

    /// Probe motion and reply timing for a session
    pub fn probe_config(&self) -> ProbeSessionConfig {
        let p = &self.config.probing;
        ProbeSessionConfig {
            clearance_z: p.clearance_z,
            clearance_feed: p.clearance_feed,
            probe_target_z: p.probe_target_z,
            probe_feed: p.probe_feed,
            reply_timeout: Duration::from_millis(self.config.connection.reply_timeout_ms),
            startup_drain: self.config.connection.startup_drain,
        }
    }

    fn leveling_options(&self, mill_depth: f64) -> LevelingOptions {
        LevelingOptions {
            mill_depth,
            strict: self.config.leveling.strict,
        }
    }

    /// Probe the job's area through the transport `connect` opens, then
    /// level the job's input file if it has one
    pub fn run<T, F>(&self, job: &LevelingJob, connect: F) -> Result<PipelineOutcome>
    where
        T: Transport,
        F: FnOnce(&ConnectionParams) -> Result<T>,
    {
        let plan = ProbeGridGenerator::new(job.grid()).generate()?;
        tracing::info!(
            "Probing {} points ({} x {})",
            plan.len(),
            plan.columns(),
            plan.rows()
        );

        if let Some(input) = &job.input {
            self.check_input(input)?;
            if !interpolable(&plan) {
                return Err(SurfaceError::InsufficientSamples {
                    distinct_x: plan.columns(),
                    distinct_y: plan.rows(),
                    required: MIN_AXIS_SAMPLES,
                }
                .into());
            }
        }

        let transport = connect(&self.connection_params())?;
        tracing::info!("Connected to {}", transport.name());

        let log_path = &self.config.output.height_log;
        let partial = partial_log_path(log_path);
        let mut session = ProbeSession::new(transport, self.probe_config());
        let height_map = {
            let mut log = BufWriter::new(File::create(&partial)?);
            let map = session.run(plan.points(), &mut log)?;
            log.flush()?;
            map
        };
        fs::rename(&partial, log_path)?;
        tracing::info!("Height log written to {}", log_path.display());

        self.finish(plan, height_map, job.input.as_deref(), job.mill_depth)
    }

    /// Level `input` with heights from a log written by an earlier run
    pub fn level_from_log(
        &self,
        log: &Path,
        input: &Path,
        mill_depth: f64,
    ) -> Result<(BicubicSurface, PathBuf, LevelingReport)> {
        self.check_input(input)?;
        let height_map = HeightMap::parse_log(&fs::read_to_string(log)?)?;
        tracing::info!("Loaded {} heights from {}", height_map.len(), log.display());

        let surface = BicubicSurface::build(&height_map)?;
        let (output, report) = ToolpathLeveler::new(&surface, self.leveling_options(mill_depth))
            .level_file(input, &self.config.leveling.output_marker)?;
        Ok((surface, output, report))
    }

    fn check_input(&self, input: &Path) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(ToolpathError::MissingInput {
                path: input.display().to_string(),
            }
            .into());
        }
        leveled_file_name(input, &self.config.leveling.output_marker)
    }

    fn finish(
        &self,
        plan: ScanPlan,
        height_map: HeightMap,
        input: Option<&Path>,
        mill_depth: f64,
    ) -> Result<PipelineOutcome> {
        let surface = if input.is_some() || interpolable(&plan) {
            let surface = BicubicSurface::build(&height_map)?;
            tracing::info!(
                "Surface fitted on {} x {} probe positions",
                surface.x_knots().len(),
                surface.y_knots().len()
            );
            Some(surface)
        } else {
            tracing::info!(
                "{} x {} grid is too small for a surface, need {} points per axis",
                plan.columns(),
                plan.rows(),
                MIN_AXIS_SAMPLES
            );
            None
        };

        let leveled = match (input, &surface) {
            (Some(input), Some(surface)) => {
                let leveler = ToolpathLeveler::new(surface, self.leveling_options(mill_depth));
                Some(leveler.level_file(input, &self.config.leveling.output_marker)?)
            }
            _ => None,
        };

        Ok(PipelineOutcome {
            plan,
            height_map,
            surface,
            leveled,
        })
    }
}

fn interpolable(plan: &ScanPlan) -> bool {
    plan.columns() >= MIN_AXIS_SAMPLES && plan.rows() >= MIN_AXIS_SAMPLES
}

/// `heights.txt` -> `heights.txt.partial`
fn partial_log_path(log: &Path) -> PathBuf {
    let mut name = OsString::from(log.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}
