//! GRBL Response Parser
//!
//! Classifies the lines GRBL sends back while a probing session runs. Only
//! probe results carry data the session needs; everything else is kept for
//! logging.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Result of a `G38.2` probe cycle, reported as `[PRB:x,y,z]` or `[PRB:x,y,z:ok]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// X where the probe stopped, controller frame
    pub x: f64,
    /// Y where the probe stopped, controller frame
    pub y: f64,
    /// Z where the probe made contact, controller frame
    pub z: f64,
    /// Contact flag sent by GRBL 1.1; `None` for firmware without it
    pub success: Option<bool>,
}

/// GRBL response types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrblResponse {
    /// OK acknowledgment
    Ok,
    /// Error response with error code
    Error(u8),
    /// Alarm response with alarm code
    Alarm(u8),
    /// Probe cycle result
    Probe(ProbeReport),
    /// Version/welcome banner
    Version(String),
    /// Startup message or other text
    Message(String),
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(
                f,
                "error:{} ({})",
                code,
                GrblResponseParser::error_description(*code)
            ),
            Self::Alarm(code) => write!(
                f,
                "ALARM:{} ({})",
                code,
                GrblResponseParser::alarm_description(*code)
            ),
            Self::Probe(p) => write!(f, "probe:{:.3},{:.3},{:.3}", p.x, p.y, p.z),
            Self::Version(version) => write!(f, "version:{}", version),
            Self::Message(msg) => write!(f, "message:{}", msg),
        }
    }
}

fn probe_regex() -> &'static Regex {
    static PROBE_REGEX: OnceLock<Regex> = OnceLock::new();
    PROBE_REGEX.get_or_init(|| {
        Regex::new(r"(?i)^\[PRB:([-+\d.]+),([-+\d.]+),([-+\d.]+)(?::([01]))?\]")
            .expect("invalid probe regex")
    })
}

/// GRBL response parser
#[derive(Debug, Default)]
pub struct GrblResponseParser;

impl GrblResponseParser {
    /// Create a new GRBL response parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a GRBL response line
    pub fn parse(&self, line: &str) -> Option<GrblResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line.eq_ignore_ascii_case("ok") {
            return Some(GrblResponse::Ok);
        }

        if let Some(code) = Self::coded(line, "error:") {
            return Some(GrblResponse::Error(code));
        }

        if let Some(code) = Self::coded(line, "alarm:") {
            return Some(GrblResponse::Alarm(code));
        }

        if let Some(report) = self.parse_probe(line) {
            return Some(GrblResponse::Probe(report));
        }

        if line.starts_with("Grbl ") {
            return Some(GrblResponse::Version(line.to_string()));
        }

        Some(GrblResponse::Message(line.to_string()))
    }

    /// Parse a probe result line, `None` if the line is not a well formed one
    pub fn parse_probe(&self, line: &str) -> Option<ProbeReport> {
        let caps = probe_regex().captures(line.trim())?;
        let x = caps[1].parse::<f64>().ok()?;
        let y = caps[2].parse::<f64>().ok()?;
        let z = caps[3].parse::<f64>().ok()?;
        let success = caps.get(4).map(|m| m.as_str() == "1");

        Some(ProbeReport { x, y, z, success })
    }

    fn coded(line: &str, prefix: &str) -> Option<u8> {
        let head = line.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        line[prefix.len()..].trim().parse::<u8>().ok()
    }

    /// Get error description
    pub fn error_description(code: u8) -> &'static str {
        match code {
            1 => "Expected command letter",
            2 => "Bad number format",
            3 => "Invalid statement",
            4 => "Negative value",
            5 => "Setting disabled",
            9 => "G-code locked out during alarm or jog state",
            15 => "Travel exceeded",
            20 => "Unsupported or invalid g-code command",
            21 => "Modal group violation",
            22 => "Undefined feed rate",
            _ => "Unknown error",
        }
    }

    /// Get alarm description
    pub fn alarm_description(code: u8) -> &'static str {
        match code {
            1 => "Hard limit triggered",
            2 => "Soft limit exceeded",
            3 => "Abort during cycle",
            4 => "Probe fail",
            5 => "Probe not triggered",
            6 => "Homing fail",
            7 => "Homing fail pulloff",
            8 => "Spindle control failure",
            9 => "Cooling mist control failure",
            _ => "Unknown alarm",
        }
    }
}
