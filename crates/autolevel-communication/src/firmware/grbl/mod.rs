//! GRBL firmware support
//!
//! - `response_parser`: classification of controller replies
//! - `probing`: the per-point probe protocol

pub mod probing;
pub mod response_parser;

pub use probing::{ProbeSession, ProbeSessionConfig, ProbeState};
pub use response_parser::{GrblResponse, GrblResponseParser, ProbeReport};
