//! Telemetry data structures and sources.
//!
//! This module defines the snapshot data model, the [`TelemetrySource`] read
//! boundary, and two sources: [`SystemCollector`] for the local machine and
//! [`HttpSource`] for a remote telemetry endpoint.

pub mod collector;
pub mod data;
pub mod remote;
pub mod traits;

// Re-export commonly used items
pub use collector::SystemCollector;
pub use data::{Snapshot, VolatileSnapshot};
pub use remote::HttpSource;
pub use traits::TelemetrySource;
