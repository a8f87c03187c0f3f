//! # Autolevel Core
//!
//! Core types shared by every autolevel crate: the error hierarchy, probe
//! coordinates and the height map produced by a probing session.

pub mod data;
pub mod error;

pub use data::{
    height_map::{HeightBounds, HeightMap, HeightSample},
    Coordinate,
};

pub use error::{
    ConnectionError, Error, GridError, ProbeError, Result, SurfaceError, ToolpathError,
};
