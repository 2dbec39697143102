//! Data models for NIBE Uplink telemetry

mod category;
mod parameter;

pub use category::*;
pub use parameter::*;
