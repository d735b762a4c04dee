// Common library shared by the tickway gateway binary and its tests

pub mod bus;
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod ticker;
