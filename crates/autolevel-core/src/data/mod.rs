//! Data models for autolevel
//!
//! Plain values passed between the scan plan generator, the probe session
//! and the surface interpolator.

pub mod height_map;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A probe position on the work surface in millimeters
///
/// Equality is exact. Scan plans compute every coordinate as an integer
/// multiple of the step, so the same lattice position always produces the
/// same bits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
}

impl Coordinate {
    /// The height datum every offset is measured against
    pub const ORIGIN: Coordinate = Coordinate { x: 0.0, y: 0.0 };

    /// Create a new coordinate
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether this is exactly the datum position (0, 0)
    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Whether both axes are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        assert!(Coordinate::ORIGIN.is_origin());
        assert!(Coordinate::new(-0.0, 0.0).is_origin());
        assert!(!Coordinate::new(0.0, 10.0).is_origin());
    }

    #[test]
    fn test_display() {
        assert_eq!(Coordinate::new(-10.0, 2.5).to_string(), "(-10.000, 2.500)");
    }

    #[test]
    fn test_serde_roundtrip() {
        let c = Coordinate::new(1.5, -2.25);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":-2.25}"#);
    }
}
