//! Probe grid generation
//!
//! Produces the serpentine (boustrophedon) sequence of points a probe run
//! visits. Rows run along X; even rows travel away from the origin, odd rows
//! travel back, so each row starts next to where the previous one ended.

use autolevel_core::{Coordinate, GridError, Result};
use serde::{Deserialize, Serialize};

/// Largest scan plan a grid may produce
pub const MAX_PLAN_POINTS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeGridParameters {
    /// Extent of the area along X (mm)
    pub width: f64,
    /// Extent of the area along Y (mm)
    pub height: f64,
    /// Spacing between columns; the sign sets the X direction of travel
    pub step_x: f64,
    /// Spacing between rows; the sign sets the Y direction of travel
    pub step_y: f64,
}

/// Ordered probe positions, row by row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPlan {
    points: Vec<Coordinate>,
    columns: usize,
    rows: usize,
}

impl ScanPlan {
    /// Points in travel order
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points per row
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Points of row `j` in travel order
    pub fn row(&self, j: usize) -> Option<&[Coordinate]> {
        let start = j.checked_mul(self.columns)?;
        self.points.get(start..start.checked_add(self.columns)?)
    }
}

pub struct ProbeGridGenerator {
    params: ProbeGridParameters,
}

impl ProbeGridGenerator {
    pub fn new(params: ProbeGridParameters) -> Self {
        Self { params }
    }

    /// Shorthand for `ProbeGridGenerator::new(..).generate()`
    pub fn plan(width: f64, height: f64, step_x: f64, step_y: f64) -> Result<ScanPlan> {
        Self::new(ProbeGridParameters {
            width,
            height,
            step_x,
            step_y,
        })
        .generate()
    }

    pub fn generate(&self) -> Result<ScanPlan> {
        self.validate()?;
        let p = &self.params;
        let (columns, rows) = self.counts()?;

        let mut points = Vec::with_capacity(columns * rows);
        for j in 0..rows {
            let y = multiple(j, p.step_y);
            let row = (0..columns).map(|i| Coordinate::new(multiple(i, p.step_x), y));
            if j % 2 == 0 {
                points.extend(row);
            } else {
                points.extend(row.rev());
            }
        }

        tracing::debug!(
            "Scan plan {}x{} ({} points) over {:.1} x {:.1} mm",
            columns,
            rows,
            points.len(),
            p.width,
            p.height
        );

        Ok(ScanPlan {
            points,
            columns,
            rows,
        })
    }

    /// Points per row and number of rows, bounded by [`MAX_PLAN_POINTS`]
    fn counts(&self) -> Result<(usize, usize)> {
        let p = &self.params;
        let columns = (p.width / p.step_x.abs()).floor() + 1.0;
        let rows = (p.height / p.step_y.abs()).floor() + 1.0;

        if columns * rows > MAX_PLAN_POINTS as f64 {
            return Err(self.invalid(format!(
                "{} x {} points exceeds the limit of {}",
                columns, rows, MAX_PLAN_POINTS
            )));
        }
        let (columns, rows) = (columns as usize, rows as usize);
        match columns.checked_mul(rows) {
            Some(n) if n <= MAX_PLAN_POINTS => Ok((columns, rows)),
            _ => Err(self.invalid(format!("more than {} points", MAX_PLAN_POINTS))),
        }
    }

    fn invalid(&self, reason: String) -> autolevel_core::Error {
        let p = &self.params;
        GridError::InvalidGrid {
            width: p.width,
            height: p.height,
            step_x: p.step_x,
            step_y: p.step_y,
            reason,
        }
        .into()
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        let reason = if ![p.width, p.height, p.step_x, p.step_y]
            .iter()
            .all(|v| v.is_finite())
        {
            Some("dimensions and steps must be finite")
        } else if p.step_x == 0.0 || p.step_y == 0.0 {
            Some("steps must be non-zero")
        } else if p.width <= p.step_x.abs() {
            Some("width must exceed |step_x|")
        } else if p.height < p.step_y.abs() {
            Some("height must be at least |step_y|")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(self.invalid(reason.to_string())),
            None => Ok(()),
        }
    }
}

/// `n * step`, with a zero result always positive so a negative step still
/// starts at exactly (0, 0)
fn multiple(n: usize, step: f64) -> f64 {
    n as f64 * step + 0.0
}
