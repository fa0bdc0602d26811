//! Live synchronization of a telemetry snapshot.
//!
//! A [`SyncController`] loads a full snapshot once, then keeps the volatile
//! fields fresh by polling on a [`Scheduler`], merging each partial result into
//! a [`SnapshotStore`]. Pause/resume, manual refresh and teardown are driven
//! through a cloneable [`SyncHandle`]; changes are pushed to a single
//! [`Renderer`].

pub mod config;
pub mod controller;
pub mod machine;
pub mod scheduler;
pub mod store;

pub use config::SyncConfig;
pub use controller::{SyncController, SyncHandle, SyncStatus};
pub use machine::SyncMachine;
pub use scheduler::Scheduler;
pub use store::{merge_partial, replace_full, SnapshotStore};

use crate::error::ErrorInfo;
use crate::metrics::data::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the controller.
///
/// Pausing is tracked separately and only gates ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// The two kinds of telemetry fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchKind {
    /// Complete inventory; initial load, manual refresh and retry
    Full,
    /// Volatile subset; background polling
    Partial,
}

/// Consumer of synchronized state.
///
/// Callbacks run on the controller task right after the change was applied
/// and must not block.
pub trait Renderer: Send {
    /// A new snapshot value is visible.
    fn on_snapshot_changed(&mut self, snapshot: &Snapshot, last_updated: DateTime<Utc>);

    /// A full fetch failed.
    fn on_error(&mut self, error: &ErrorInfo);

    /// The lifecycle state or the paused flag changed.
    fn on_state_changed(&mut self, _state: SyncState, _paused: bool) {}
}

/// Renderer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn on_snapshot_changed(&mut self, _snapshot: &Snapshot, _last_updated: DateTime<Utc>) {}

    fn on_error(&mut self, _error: &ErrorInfo) {}
}
