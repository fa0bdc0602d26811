//! Snapshot storage and the partial-merge operation.

use crate::error::{Result, SyncError};
use crate::metrics::data::{Snapshot, VolatileSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Derive a new snapshot from `old` with the volatile leaves of `partial` applied.
///
/// Only `cpu.temperature`, `cpu.current_load` and `memory` can change. Fields
/// absent from `partial` keep their current value. The static sections are
/// shared with `old`, so the cost is bounded by the volatile subset.
///
/// A partial carrying no volatile field at all is a [`SyncError::SchemaMismatch`].
pub fn merge_partial(old: &Snapshot, partial: &VolatileSnapshot) -> Result<Snapshot> {
    if partial.is_empty() {
        return Err(SyncError::schema_mismatch(
            "volatile response carried neither cpu nor memory readings",
        ));
    }

    let mut merged = old.clone();
    if let Some(cpu) = partial.cpu {
        if let Some(temperature) = cpu.temperature {
            if old.cpu.temperature.is_none() {
                tracing::debug!(temperature, "CPU temperature reported for the first time");
            }
            merged.cpu.temperature = Some(temperature);
        }
        if let Some(load) = cpu.current_load {
            merged.cpu.current_load = load;
        }
    }
    if let Some(memory) = partial.memory {
        merged.memory = memory;
    }
    Ok(merged)
}

/// Total replacement, used by initial load and manual refresh.
pub fn replace_full(_old: Option<&Snapshot>, full: Snapshot) -> Snapshot {
    full
}

/// Holds the current merged snapshot and its freshness timestamp.
///
/// The snapshot is published as an `Arc` and never mutated in place; readers
/// holding a previous `Arc` keep a consistent view.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Option<Arc<Snapshot>>,
    last_updated: Option<DateTime<Utc>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if any full fetch has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }

    /// When the snapshot last changed.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Replace the snapshot wholesale.
    pub fn replace_full(&mut self, full: Snapshot, now: DateTime<Utc>) -> Arc<Snapshot> {
        let next = Arc::new(replace_full(self.current.as_deref(), full));
        self.current = Some(next.clone());
        self.touch(now);
        next
    }

    /// Apply a partial update on top of the current snapshot.
    ///
    /// Fails with [`SyncError::SchemaMismatch`] when there is no baseline to
    /// merge into or when the partial is empty; the store is left untouched.
    pub fn merge_partial(
        &mut self,
        partial: &VolatileSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Arc<Snapshot>> {
        let current = self.current.as_deref().ok_or_else(|| {
            SyncError::schema_mismatch("partial update received before any full snapshot")
        })?;
        let next = Arc::new(merge_partial(current, partial)?);
        self.current = Some(next.clone());
        self.touch(now);
        Ok(next)
    }

    /// Drop the snapshot and its timestamp, e.g. on controller teardown.
    pub fn clear(&mut self) {
        self.current = None;
        self.last_updated = None;
    }

    // last_updated never moves backwards, even if the wall clock does.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(match self.last_updated {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}
