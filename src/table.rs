//! Text rendering of a height map
//!
//! Lays the samples out as they sit on the machine bed: one column per
//! distinct X (ascending), one row per distinct Y with the largest Y on top.

use autolevel_core::{Coordinate, HeightMap};
use std::fmt::Write;

const CELL: usize = 9;

/// Render the map as a fixed width table of heights in mm
pub fn format_height_table(map: &HeightMap) -> String {
    let xs = axis(map.iter().map(|s| s.point.x));
    let ys = axis(map.iter().map(|s| s.point.y));

    let mut out = String::new();
    if xs.is_empty() {
        return out;
    }

    let _ = write!(out, "{:>w$}", "Y \\ X", w = CELL);
    for x in &xs {
        let _ = write!(out, "{:>w$.1}", x, w = CELL);
    }
    out.push('\n');

    for y in ys.iter().rev() {
        let _ = write!(out, "{:>w$.1}", y, w = CELL);
        for x in &xs {
            match map.find(Coordinate::new(*x, *y)) {
                Some(sample) => {
                    let _ = write!(out, "{:>w$.3}", sample.height, w = CELL);
                }
                None => {
                    let _ = write!(out, "{:>w$}", "-", w = CELL);
                }
            }
        }
        out.push('\n');
    }

    if let Some(b) = map.bounds() {
        let _ = writeln!(
            out,
            "{} points, height {:.3} to {:.3} mm (range {:.3})",
            map.len(),
            b.min_height,
            b.max_height,
            b.max_height - b.min_height
        );
    }
    out
}

fn axis(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut map = HeightMap::new();
        map.insert(0, Coordinate::new(0.0, 0.0), 0.0);
        map.insert(1, Coordinate::new(10.0, 0.0), -0.02);
        map.insert(2, Coordinate::new(10.0, 10.0), 0.015);

        let table = format_height_table(&map);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "    Y \\ X      0.0     10.0");
        assert_eq!(lines[1], "     10.0        -    0.015");
        assert_eq!(lines[2], "      0.0    0.000   -0.020");
        assert_eq!(lines[3], "3 points, height -0.020 to 0.015 mm (range 0.035)");
    }

    #[test]
    fn test_empty_map() {
        assert!(format_height_table(&HeightMap::new()).is_empty());
    }
}
