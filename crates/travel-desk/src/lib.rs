//! Corporate travel-request engine: trip lifecycle, policy evaluation, and offline
//! destination risk scoring.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
