//! Error handling for autolevel
//!
//! Provides error types for every stage of a leveling run:
//! - Grid errors (scan plan generation)
//! - Connection errors (serial transport)
//! - Probe errors (controller protocol)
//! - Surface errors (height map interpolation)
//! - Toolpath errors (G-code rewriting and output naming)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Scan plan error type
///
/// Raised before any hardware interaction when the requested area and step
/// sizes cannot produce a usable probe grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// Area and step combination does not form a grid
    #[error("Invalid grid {width}x{height} with steps ({step_x}, {step_y}): {reason}")]
    InvalidGrid {
        /// Requested area width in mm.
        width: f64,
        /// Requested area height in mm.
        height: f64,
        /// Requested X step in mm.
        step_x: f64,
        /// Requested Y step in mm.
        step_y: f64,
        /// Which precondition failed.
        reason: String,
    },
}

/// Connection error type
///
/// Represents failures of the byte stream to the controller.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// I/O error on an open connection
    #[error("I/O error on {port}: {reason}")]
    Io {
        /// The port the error happened on.
        port: String,
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Probe protocol error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// No probe reply arrived within the allowed wait
    #[error("No probe reply for point #{index} ({x:.3}, {y:.3}) after {timeout_ms}ms")]
    TimedOut {
        /// Index of the point in the scan plan.
        index: usize,
        /// X coordinate of the point.
        x: f64,
        /// Y coordinate of the point.
        y: f64,
        /// The wait that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The scan plan does not start at the datum (0, 0)
    #[error("Scan plan must start at the datum (0, 0), found ({x}, {y})")]
    MissingDatum {
        /// X of the first point.
        x: f64,
        /// Y of the first point.
        y: f64,
    },

    /// The scan plan contains no points
    #[error("Scan plan is empty")]
    EmptyPlan,
}

/// Surface interpolation error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// Not enough distinct sample positions for a bicubic fit
    #[error(
        "Insufficient samples: {distinct_x} distinct X and {distinct_y} distinct Y values, need at least {required} of each"
    )]
    InsufficientSamples {
        /// Distinct X values found.
        distinct_x: usize,
        /// Distinct Y values found.
        distinct_y: usize,
        /// Minimum per axis.
        required: usize,
    },

    /// A lattice node has no sample
    #[error("Height map is not a complete grid: no sample at ({x}, {y})")]
    IncompleteGrid {
        /// X of the missing node.
        x: f64,
        /// Y of the missing node.
        y: f64,
    },

    /// A sample is NaN or infinite
    #[error("Sample #{index} has a non-finite value")]
    NonFiniteSample {
        /// Scan plan index of the sample.
        index: usize,
    },
}

/// Toolpath rewriting error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolpathError {
    /// A recognized move carries a number that does not parse (strict mode)
    #[error("Unparseable coordinate in '{text}' at line {line}")]
    PatternMismatch {
        /// 1-based line number of the match.
        line: usize,
        /// The matched text.
        text: String,
    },

    /// No extension to derive the leveled file name from
    #[error("Cannot derive leveled file name from '{name}': no extension")]
    InvalidFilename {
        /// The offending file name.
        name: String,
    },

    /// The toolpath file to level does not exist
    #[error("Input file not found: {path}")]
    MissingInput {
        /// The path that was requested.
        path: String,
    },
}

/// Main error type for autolevel
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Grid error
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Probe error
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Surface error
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// Toolpath error
    #[error(transparent)]
    Toolpath(#[from] ToolpathError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Probe(ProbeError::TimedOut { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error is raised before the controller is touched
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Grid(_)
                | Error::Toolpath(ToolpathError::InvalidFilename { .. })
                | Error::Toolpath(ToolpathError::MissingInput { .. })
                | Error::Probe(ProbeError::MissingDatum { .. })
                | Error::Probe(ProbeError::EmptyPlan)
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
