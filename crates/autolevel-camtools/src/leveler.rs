//! Toolpath leveling
//!
//! Rewrites the Z of a G-code program so the cut follows the probed surface.
//! Two move shapes are recognized on whitespace-normalized text:
//!
//! - `G1 X<num> Y<num>` without a Z word: a Z is appended
//! - `G0 X<num> Y<num>` directly followed by a `G1 Z<num>` line: the plunge
//!   depth is replaced
//!
//! Every other line passes through untouched. The new Z is the surface
//! height at the move's XY minus the mill depth.

use crate::surface::Surface;
use autolevel_core::{Result, ToolpathError};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Marker inserted before the extension of leveled files
pub const DEFAULT_MARKER: &str = ".LEV";

fn spaces_regex() -> &'static Regex {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    SPACES.get_or_init(|| Regex::new(r"[ ]{2,}").expect("invalid regex pattern"))
}

fn linear_move_regex() -> &'static Regex {
    static LINEAR: OnceLock<Regex> = OnceLock::new();
    LINEAR.get_or_init(|| {
        Regex::new(r"G1 X([-0-9.]+) Y([-0-9.]+)( Z[-0-9.]+)?").expect("invalid regex pattern")
    })
}

fn plunge_pair_regex() -> &'static Regex {
    static PLUNGE: OnceLock<Regex> = OnceLock::new();
    PLUNGE.get_or_init(|| {
        Regex::new(r"G0 X([-0-9.]+) Y([-0-9.]+)\nG1 Z([-0-9.]+)").expect("invalid regex pattern")
    })
}

/// Convert line breaks to `\n`, collapse runs of spaces and strip a space
/// before each line break
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    spaces_regex().replace_all(&text, " ").replace(" \n", "\n")
}

/// Name of the leveled copy of `path`: `foo.nc` becomes `foo<marker>.nc`
pub fn leveled_file_name(path: &Path, marker: &str) -> Result<PathBuf> {
    let invalid = || ToolpathError::InvalidFilename {
        name: path.display().to_string(),
    };

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let dot = name.rfind('.').ok_or_else(invalid)?;
    if dot == 0 {
        return Err(invalid().into());
    }

    let (stem, extension) = name.split_at(dot);
    Ok(path.with_file_name(format!("{}{}{}", stem, marker, extension)))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelingOptions {
    /// Depth below the surface to cut (mm)
    pub mill_depth: f64,
    /// Fail on a recognized move with an unparseable number instead of
    /// passing it through
    pub strict: bool,
}

impl Default for LevelingOptions {
    fn default() -> Self {
        Self {
            mill_depth: 0.1,
            strict: false,
        }
    }
}

/// What a leveling pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelingReport {
    /// `G1 X Y` moves that received a Z
    pub linear_moves: usize,
    /// `G0 X Y` + `G1 Z` pairs whose Z was replaced
    pub plunge_pairs: usize,
    /// Rewritten moves outside the probed area (clamped to its edge)
    pub out_of_extent: usize,
    /// Recognized moves left as-is because a number did not parse
    pub unparsed: usize,
}

impl LevelingReport {
    pub fn rewritten(&self) -> usize {
        self.linear_moves + self.plunge_pairs
    }
}

/// A pattern match and the 1-based line it starts on
struct Match<'c, 'h> {
    caps: &'c Captures<'h>,
    line: usize,
}

/// Applies a height surface to G-code text
pub struct ToolpathLeveler<'a, S: Surface + ?Sized> {
    surface: &'a S,
    options: LevelingOptions,
}

impl<'a, S: Surface + ?Sized> ToolpathLeveler<'a, S> {
    pub fn new(surface: &'a S, options: LevelingOptions) -> Self {
        Self { surface, options }
    }

    /// Level a whole program held in memory
    pub fn level(&self, text: &str) -> Result<(String, LevelingReport)> {
        let mut report = LevelingReport::default();
        let text = normalize(text);

        let text = self.rewrite(&text, linear_move_regex(), &mut report, |this, m, report| {
            if m.caps.get(3).is_some() {
                return Ok(None);
            }
            let Some((x, y)) = this.parse_xy(m, report)? else {
                return Ok(None);
            };
            let (x, y, z) = this.target(&x, &y, report);
            report.linear_moves += 1;
            Ok(Some(format!("G1 X{} Y{} Z{}", x, y, z)))
        })?;

        let text = self.rewrite(&text, plunge_pair_regex(), &mut report, |this, m, report| {
            if m.caps[3].parse::<f64>().is_err() {
                return this.unparsed(m, report);
            }
            let Some((x, y)) = this.parse_xy(m, report)? else {
                return Ok(None);
            };
            let (x, y, z) = this.target(&x, &y, report);
            report.plunge_pairs += 1;
            Ok(Some(format!("G0 X{} Y{}\nG1 Z{}", x, y, z)))
        })?;

        tracing::info!(
            "Leveled {} linear moves and {} plunges ({} outside the probed area)",
            report.linear_moves,
            report.plunge_pairs,
            report.out_of_extent
        );
        Ok((text, report))
    }

    /// Level `input` into a sibling file named with `marker`
    ///
    /// The output is written once, after the whole program has been
    /// rewritten in memory.
    pub fn level_file(&self, input: &Path, marker: &str) -> Result<(PathBuf, LevelingReport)> {
        if !input.is_file() {
            return Err(ToolpathError::MissingInput {
                path: input.display().to_string(),
            }
            .into());
        }
        let output = leveled_file_name(input, marker)?;

        let text = fs::read_to_string(input)?;
        let (leveled, report) = self.level(&text)?;
        fs::write(&output, leveled)?;

        tracing::info!("Wrote {}", output.display());
        Ok((output, report))
    }

    fn rewrite<F>(
        &self,
        text: &str,
        pattern: &Regex,
        report: &mut LevelingReport,
        mut replace: F,
    ) -> Result<String>
    where
        F: FnMut(&Self, &Match<'_, '_>, &mut LevelingReport) -> Result<Option<String>>,
    {
        let mut out = String::with_capacity(text.len() + text.len() / 8);
        let mut last = 0;
        let mut line = 1;

        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let skipped = &text[last..whole.start()];
            line += skipped.matches('\n').count();
            out.push_str(skipped);

            let found = Match {
                caps: &caps,
                line,
            };
            line += whole.as_str().matches('\n').count();
            match replace(self, &found, report)? {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn parse_xy(
        &self,
        m: &Match<'_, '_>,
        report: &mut LevelingReport,
    ) -> Result<Option<(String, String)>> {
        match (m.caps[1].parse::<f64>(), m.caps[2].parse::<f64>()) {
            (Ok(x), Ok(y)) => Ok(Some((format!("{:.4}", x), format!("{:.4}", y)))),
            _ => self.unparsed(m, report),
        }
    }

    fn unparsed<R>(&self, m: &Match<'_, '_>, report: &mut LevelingReport) -> Result<Option<R>> {
        let text = &m.caps[0];
        if self.options.strict {
            return Err(ToolpathError::PatternMismatch {
                line: m.line,
                text: text.to_string(),
            }
            .into());
        }
        tracing::warn!("Leaving line {} unchanged: '{}'", m.line, text.escape_debug());
        report.unparsed += 1;
        Ok(None)
    }

    /// Formatted X, Y and the leveled Z
    ///
    /// The surface is sampled at the rounded coordinates that end up in the
    /// output, so a leveled file levels to itself.
    fn target(&self, x: &str, y: &str, report: &mut LevelingReport) -> (String, String, String) {
        let xr = x.parse::<f64>().unwrap_or_default();
        let yr = y.parse::<f64>().unwrap_or_default();
        if !self.surface.contains(xr, yr) {
            report.out_of_extent += 1;
            tracing::debug!("X{} Y{} is outside the probed area", x, y);
        }
        let z = self.surface.height_at(xr, yr) - self.options.mill_depth;
        (x.to_string(), y.to_string(), format!("{:.3}", z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceExtent;
    use autolevel_core::Error;

    /// Falls 0.002 mm per mm of X over a 30 x 30 area
    struct Tilted;

    impl Surface for Tilted {
        fn height_at(&self, x: f64, _y: f64) -> f64 {
            -0.002 * x.clamp(0.0, 30.0)
        }

        fn extent(&self) -> SurfaceExtent {
            SurfaceExtent {
                min_x: 0.0,
                max_x: 30.0,
                min_y: 0.0,
                max_y: 30.0,
            }
        }
    }

    fn leveler(strict: bool) -> ToolpathLeveler<'static, Tilted> {
        ToolpathLeveler::new(
            &Tilted,
            LevelingOptions {
                mill_depth: 0.1,
                strict,
            },
        )
    }

    #[test]
    fn test_linear_move_gets_z() {
        let (out, report) = leveler(false).level("G1 X10.0 Y0.0\n").unwrap();
        assert_eq!(out, "G1 X10.0000 Y0.0000 Z-0.120\n");
        assert_eq!(report.linear_moves, 1);
        assert_eq!(report.plunge_pairs, 0);
    }

    #[test]
    fn test_plunge_pair_is_replaced() {
        let input = "G0 X20 Y5\nG1 Z-1.5 F100\nG1 X25 Y5 F300\n";
        let (out, report) = leveler(false).level(input).unwrap();
        assert_eq!(
            out,
            "G0 X20.0000 Y5.0000\nG1 Z-0.140 F100\nG1 X25.0000 Y5.0000 Z-0.150 F300\n"
        );
        assert_eq!(report.rewritten(), 2);
    }

    #[test]
    fn test_whitespace_is_normalized_first() {
        let (out, _) = leveler(false).level("G1  X0   Y0 \nM5 \n").unwrap();
        assert_eq!(out, "G1 X0.0000 Y0.0000 Z-0.100\nM5\n");
    }

    #[test]
    fn test_crlf_program_is_leveled() {
        let (out, report) = leveler(false)
            .level("G0 X1 Y2\r\nG1 Z-1.5 F60\r\nG1 X5 Y2 \r\n")
            .unwrap();
        assert_eq!(
            out,
            "G0 X1.0000 Y2.0000\nG1 Z-0.102 F60\nG1 X5.0000 Y2.0000 Z-0.110\n"
        );
        assert_eq!(report.plunge_pairs, 1);
        assert_eq!(report.linear_moves, 1);
    }

    #[test]
    fn test_other_lines_pass_through() {
        let input = "(header)\nG21\nG90\nM3 S1000\nG0 Z5\nG1 Z-1\nM30\n";
        let (out, report) = leveler(false).level(input).unwrap();
        assert_eq!(out, input);
        assert_eq!(report, LevelingReport::default());
    }

    #[test]
    fn test_leveling_twice_is_identical() {
        let input = "G0 X1.23456 Y2\nG1 Z-0.5\nG1 X7.77777 Y3.1\nG1 X12 Y9 F200\n";
        let (once, _) = leveler(false).level(input).unwrap();
        let (twice, report) = leveler(false).level(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(report.linear_moves, 0);
    }

    #[test]
    fn test_existing_z_is_kept() {
        let (out, report) = leveler(false).level("G1 X1 Y2 Z-3\n").unwrap();
        assert_eq!(out, "G1 X1 Y2 Z-3\n");
        assert_eq!(report.linear_moves, 0);
    }

    #[test]
    fn test_out_of_extent_is_counted() {
        let (out, report) = leveler(false).level("G1 X40 Y0\n").unwrap();
        assert_eq!(out, "G1 X40.0000 Y0.0000 Z-0.160\n");
        assert_eq!(report.out_of_extent, 1);
    }

    #[test]
    fn test_unparseable_number() {
        let input = "G21\nG1 X1.2.3 Y4\n";
        let (out, report) = leveler(false).level(input).unwrap();
        assert_eq!(out, input);
        assert_eq!(report.unparsed, 1);

        let err = leveler(true).level(input).unwrap_err();
        match err {
            Error::Toolpath(ToolpathError::PatternMismatch { line, text }) => {
                assert_eq!(line, 2);
                assert_eq!(text, "G1 X1.2.3 Y4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_leveled_file_name() {
        assert_eq!(
            leveled_file_name(Path::new("foo.nc"), DEFAULT_MARKER).unwrap(),
            PathBuf::from("foo.LEV.nc")
        );
        assert_eq!(
            leveled_file_name(Path::new("/tmp/a.b.nc"), DEFAULT_MARKER).unwrap(),
            PathBuf::from("/tmp/a.b.LEV.nc")
        );
        assert!(matches!(
            leveled_file_name(Path::new("foo"), DEFAULT_MARKER),
            Err(Error::Toolpath(ToolpathError::InvalidFilename { .. }))
        ));
        assert!(leveled_file_name(Path::new(".nc"), DEFAULT_MARKER).is_err());
        assert!(leveled_file_name(Path::new("/"), DEFAULT_MARKER).is_err());
    }
}
