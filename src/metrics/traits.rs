//! Traits for telemetry acquisition.

use crate::error::Result;
use crate::metrics::data::{Snapshot, VolatileSnapshot};
use async_trait::async_trait;

/// Read boundary to whatever produces telemetry.
///
/// Both reads are idempotent and may fail with
/// [`SyncError::SourceUnavailable`](crate::SyncError::SourceUnavailable),
/// [`SyncError::Timeout`](crate::SyncError::Timeout) or
/// [`SyncError::SchemaMismatch`](crate::SyncError::SchemaMismatch).
/// Implementations must be shareable across tasks since the sync controller
/// issues fetches from spawned tasks.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read the complete inventory.
    async fn full_snapshot(&self) -> Result<Snapshot>;

    /// Read only the volatile fields (load, temperature, memory).
    async fn volatile_snapshot(&self) -> Result<VolatileSnapshot>;
}
