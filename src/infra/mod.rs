//! Infrastructure adapters and runtime bootstrap.

pub mod engines;
pub mod error;
pub mod http;
pub mod telemetry;
pub mod uploads;
