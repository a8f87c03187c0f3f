//! # Autolevel Communication
//!
//! Byte stream transports to the motion controller and the GRBL probing
//! protocol that runs over them.

pub mod communication;
pub mod firmware;

pub use communication::{
    serial::{list_ports, SerialPortInfo, SerialTransport},
    ConnectionParams, LineReader, SerialParity, Transport,
};

pub use firmware::grbl::{
    probing::{ProbeSession, ProbeSessionConfig, ProbeState},
    response_parser::{GrblResponse, GrblResponseParser, ProbeReport},
};
