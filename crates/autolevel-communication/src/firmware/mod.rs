//! Firmware protocols
//!
//! Only GRBL is supported; its probe cycle (`G38.2`) and `[PRB:...]` report
//! are what the leveling workflow relies on.

pub mod grbl;
