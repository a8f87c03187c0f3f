//! Height map built by a probe session
//!
//! Samples are keyed by their index in the scan plan rather than by the
//! floating point coordinate, and store the coordinate alongside. Heights are
//! offsets from the reading taken at the datum (0, 0), whose own offset is
//! exactly zero.

use super::Coordinate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One probed point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightSample {
    /// Position of the point in the scan plan
    pub index: usize,
    /// Where the point was probed
    pub point: Coordinate,
    /// Offset from the datum reading in mm
    pub height: f64,
}

/// Extent of a height map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_height: f64,
    pub max_height: f64,
}

/// Scattered height samples relative to the datum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightMap {
    samples: BTreeMap<usize, HeightSample>,
}

impl HeightMap {
    /// Create an empty height map
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the height for a scan plan point
    ///
    /// Returns the previous sample if the index was already present.
    pub fn insert(&mut self, index: usize, point: Coordinate, height: f64) -> Option<HeightSample> {
        self.samples.insert(
            index,
            HeightSample {
                index,
                point,
                height,
            },
        )
    }

    /// Sample for a scan plan index
    pub fn get(&self, index: usize) -> Option<&HeightSample> {
        self.samples.get(&index)
    }

    /// Sample probed at exactly this coordinate
    pub fn find(&self, point: Coordinate) -> Option<&HeightSample> {
        self.samples.values().find(|s| s.point == point)
    }

    /// The datum sample, if it has been recorded
    pub fn datum(&self) -> Option<&HeightSample> {
        self.samples.values().find(|s| s.point.is_origin())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in scan plan order
    pub fn iter(&self) -> impl Iterator<Item = &HeightSample> {
        self.samples.values()
    }

    /// Bounding box of positions and heights, `None` when empty
    pub fn bounds(&self) -> Option<HeightBounds> {
        let mut iter = self.samples.values();
        let first = iter.next()?;
        let init = HeightBounds {
            min_x: first.point.x,
            max_x: first.point.x,
            min_y: first.point.y,
            max_y: first.point.y,
            min_height: first.height,
            max_height: first.height,
        };
        Some(iter.fold(init, |b, s| HeightBounds {
            min_x: b.min_x.min(s.point.x),
            max_x: b.max_x.max(s.point.x),
            min_y: b.min_y.min(s.point.y),
            max_y: b.max_y.max(s.point.y),
            min_height: b.min_height.min(s.height),
            max_height: b.max_height.max(s.height),
        }))
    }

    /// Format a sample as a tab separated log line (with trailing newline)
    pub fn log_line(sample: &HeightSample) -> String {
        format!(
            "{:.3}\t{:.3}\t{:.3}\n",
            sample.point.x, sample.point.y, sample.height
        )
    }

    /// Render the whole map in the height log format
    pub fn to_log_string(&self) -> String {
        self.samples.values().fold(String::new(), |mut out, s| {
            out.push_str(&Self::log_line(s));
            out
        })
    }

    /// Read a height log written by a previous session
    ///
    /// Lines are assigned scan plan indices in file order. Blank lines are
    /// skipped.
    pub fn parse_log(text: &str) -> Result<Self> {
        let mut map = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<f64> = line
                .split('\t')
                .map(|f| f.trim().parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    Error::other(format!("Invalid height log line {}: {}", line_no + 1, e))
                })?;

            if fields.len() != 3 {
                return Err(Error::other(format!(
                    "Invalid height log line {}: expected 3 fields, found {}",
                    line_no + 1,
                    fields.len()
                )));
            }

            let index = map.len();
            map.insert(index, Coordinate::new(fields[0], fields[1]), fields[2]);
        }
        Ok(map)
    }
}
