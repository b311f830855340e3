//! Travel desk workflows.

pub mod trips;
