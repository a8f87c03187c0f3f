//! Height surface interpolation
//!
//! Turns a probed [`HeightMap`] into a continuous height function. The
//! samples must form a complete rectilinear lattice (every combination of
//! the distinct X and Y values probed). The fit is a tensor product of
//! natural cubic splines, so it passes exactly through every sample.

use autolevel_core::{HeightMap, Result, SurfaceError};
use serde::{Deserialize, Serialize};

/// Minimum distinct positions per axis for a bicubic fit
pub const MIN_AXIS_SAMPLES: usize = 4;

/// Rectangle covered by the samples of a surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceExtent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl SurfaceExtent {
    /// Whether (x, y) lies inside the extent, edges included
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Nearest point inside the extent
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x.clamp(self.min_x, self.max_x),
            y.clamp(self.min_y, self.max_y),
        )
    }
}

/// Continuous height function over a rectangular area
pub trait Surface {
    /// Interpolated height at (x, y)
    ///
    /// Points outside [`Surface::extent`] are evaluated at the nearest edge.
    fn height_at(&self, x: f64, y: f64) -> f64;

    /// Area in which `height_at` interpolates rather than clamps
    fn extent(&self) -> SurfaceExtent;

    fn contains(&self, x: f64, y: f64) -> bool {
        self.extent().contains(x, y)
    }
}

/// Natural cubic spline through a set of knots
#[derive(Debug, Clone, PartialEq)]
struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivatives at the knots, zero at both ends
    curvature: Vec<f64>,
}

impl CubicSpline {
    /// `knots` must be strictly increasing and at least two long
    fn natural(knots: &[f64], values: &[f64]) -> Self {
        let n = knots.len();
        let mut curvature = vec![0.0; n];

        if n > 2 {
            // Tridiagonal system for the interior second derivatives,
            // solved by forward elimination and back substitution
            let m = n - 2;
            let mut diag = vec![0.0; m];
            let mut upper = vec![0.0; m];
            let mut rhs = vec![0.0; m];

            for k in 0..m {
                let i = k + 1;
                let h0 = knots[i] - knots[i - 1];
                let h1 = knots[i + 1] - knots[i];
                let lower = h0;
                diag[k] = 2.0 * (h0 + h1);
                upper[k] = h1;
                rhs[k] = 6.0
                    * ((values[i + 1] - values[i]) / h1 - (values[i] - values[i - 1]) / h0);

                if k > 0 {
                    let w = lower / diag[k - 1];
                    diag[k] -= w * upper[k - 1];
                    rhs[k] -= w * rhs[k - 1];
                }
            }

            curvature[m] = rhs[m - 1] / diag[m - 1];
            for k in (0..m - 1).rev() {
                curvature[k + 1] = (rhs[k] - upper[k] * curvature[k + 2]) / diag[k];
            }
        }

        Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            curvature,
        }
    }

    fn eval(&self, t: f64) -> f64 {
        let n = self.knots.len();
        let k = self
            .knots
            .partition_point(|&knot| knot <= t)
            .saturating_sub(1)
            .min(n - 2);

        let h = self.knots[k + 1] - self.knots[k];
        let a = (self.knots[k + 1] - t) / h;
        let b = (t - self.knots[k]) / h;

        a * self.values[k]
            + b * self.values[k + 1]
            + ((a * a * a - a) * self.curvature[k] + (b * b * b - b) * self.curvature[k + 1]) * h
                * h
                / 6.0
    }
}

/// Bicubic spline surface through a complete lattice of height samples
#[derive(Debug, Clone, PartialEq)]
pub struct BicubicSurface {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// One spline along X per distinct Y, in `ys` order
    rows: Vec<CubicSpline>,
}

impl BicubicSurface {
    /// Fit a surface through every sample of the map
    pub fn build(map: &HeightMap) -> Result<Self> {
        for sample in map.iter() {
            if !sample.point.is_finite() || !sample.height.is_finite() {
                return Err(SurfaceError::NonFiniteSample {
                    index: sample.index,
                }
                .into());
            }
        }

        let xs = distinct(map.iter().map(|s| s.point.x));
        let ys = distinct(map.iter().map(|s| s.point.y));

        if xs.len() < MIN_AXIS_SAMPLES || ys.len() < MIN_AXIS_SAMPLES {
            return Err(SurfaceError::InsufficientSamples {
                distinct_x: xs.len(),
                distinct_y: ys.len(),
                required: MIN_AXIS_SAMPLES,
            }
            .into());
        }

        let mut lattice = vec![vec![None; xs.len()]; ys.len()];
        for sample in map.iter() {
            // Both lookups succeed: the axes were built from these samples
            if let (Some(i), Some(j)) = (position(&xs, sample.point.x), position(&ys, sample.point.y))
            {
                lattice[j][i] = Some(sample.height);
            }
        }

        let mut rows = Vec::with_capacity(ys.len());
        for (j, row) in lattice.iter().enumerate() {
            let mut values = Vec::with_capacity(xs.len());
            for (i, cell) in row.iter().enumerate() {
                match cell {
                    Some(height) => values.push(*height),
                    None => {
                        return Err(SurfaceError::IncompleteGrid { x: xs[i], y: ys[j] }.into())
                    }
                }
            }
            rows.push(CubicSpline::natural(&xs, &values));
        }

        tracing::debug!(
            "Built bicubic surface on a {}x{} lattice",
            xs.len(),
            ys.len()
        );

        Ok(Self { xs, ys, rows })
    }

    /// Distinct X positions of the lattice, ascending
    pub fn x_knots(&self) -> &[f64] {
        &self.xs
    }

    /// Distinct Y positions of the lattice, ascending
    pub fn y_knots(&self) -> &[f64] {
        &self.ys
    }
}

impl Surface for BicubicSurface {
    fn height_at(&self, x: f64, y: f64) -> f64 {
        let (x, y) = self.extent().clamp(x, y);
        let column: Vec<f64> = self.rows.iter().map(|row| row.eval(x)).collect();
        CubicSpline::natural(&self.ys, &column).eval(y)
    }

    fn extent(&self) -> SurfaceExtent {
        // build() guarantees at least MIN_AXIS_SAMPLES knots per axis
        SurfaceExtent {
            min_x: self.xs[0],
            max_x: self.xs[self.xs.len() - 1],
            min_y: self.ys[0],
            max_y: self.ys[self.ys.len() - 1],
        }
    }
}

/// Sorted unique axis values; -0.0 and 0.0 are one knot
fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.map(|v| v + 0.0).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn position(axis: &[f64], value: f64) -> Option<usize> {
    let value = value + 0.0;
    axis.binary_search_by(|probe| probe.total_cmp(&value)).ok()
}
