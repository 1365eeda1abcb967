//! Equipment-health evaluation for maintenance inspections: reading classification, status
//! aggregation, and the save pipeline that persists a unit's inspection.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
