//! The synchronization state machine.
//!
//! [`SyncMachine`] is purely synchronous: it decides which fetches to issue
//! and how their results change the store, and reports side effects for the
//! caller to carry out. The asynchronous plumbing lives in
//! [`controller`](super::controller).
//!
//! ```text
//! Uninitialized --start--> Loading --ok--> Ready --tick--> Ready
//!                             |              ^  |
//!                            err    refresh ok  | manual refresh
//!                             v              |  v
//!                           Error --refresh--> Loading
//! ```

use super::{FetchKind, SnapshotStore, SyncState};
use crate::error::{ErrorInfo, Result, SyncError};
use crate::metrics::data::{Snapshot, VolatileSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Identifies an issued fetch so its completion can be matched and vetted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    kind: FetchKind,
    epoch: u64,
}

impl FetchTicket {
    pub fn kind(&self) -> FetchKind {
        self.kind
    }
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Tell the renderer about a new snapshot value
    NotifySnapshot(Arc<Snapshot>, DateTime<Utc>),
    /// Tell the renderer a full fetch failed
    NotifyError(ErrorInfo),
    /// Begin periodic ticks
    StartScheduler,
    /// Cease periodic ticks
    StopScheduler,
}

/// Result of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Issue a partial fetch
    Fetch(FetchTicket),
    /// Nothing to do
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotReady,
    Paused,
    InFlight,
    TornDown,
}

/// Lifecycle, pause flag, single-flight guards and the snapshot store.
#[derive(Debug)]
pub struct SyncMachine {
    state: SyncState,
    paused: bool,
    alive: bool,
    store: SnapshotStore,
    // Bumped by every full fetch; partial results from an older epoch are dropped.
    epoch: u64,
    full_in_flight: bool,
    partial_in_flight: bool,
    scheduler_started: bool,
    consecutive_failures: u32,
    last_error: Option<ErrorInfo>,
}

impl Default for SyncMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMachine {
    pub fn new() -> Self {
        Self {
            state: SyncState::Uninitialized,
            paused: false,
            alive: true,
            store: SnapshotStore::new(),
            epoch: 0,
            full_in_flight: false,
            partial_in_flight: false,
            scheduler_started: false,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Number of tick failures since the last successful merge or full load.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    pub fn in_flight(&self, kind: FetchKind) -> bool {
        match kind {
            FetchKind::Full => self.full_in_flight,
            FetchKind::Partial => self.partial_in_flight,
        }
    }

    /// Begin the initial load. Only valid from `Uninitialized`.
    pub fn start(&mut self) -> Result<FetchTicket> {
        self.ensure_alive()?;
        if self.state != SyncState::Uninitialized {
            return Err(SyncError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }
        Ok(self.begin_full())
    }

    /// Re-enter `Loading` and fetch a full snapshot. Valid from any state but `Loading`.
    pub fn manual_refresh(&mut self) -> Result<FetchTicket> {
        self.ensure_alive()?;
        if self.full_in_flight {
            return Err(SyncError::AlreadyInFlight(FetchKind::Full));
        }
        Ok(self.begin_full())
    }

    fn begin_full(&mut self) -> FetchTicket {
        self.epoch += 1;
        self.full_in_flight = true;
        self.state = SyncState::Loading;
        info!(epoch = self.epoch, "Full fetch issued");
        FetchTicket {
            kind: FetchKind::Full,
            epoch: self.epoch,
        }
    }

    /// Apply the outcome of a full fetch.
    pub fn complete_full(
        &mut self,
        ticket: FetchTicket,
        result: Result<Snapshot>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if !self.accepts(ticket, FetchKind::Full) {
            return Vec::new();
        }
        self.full_in_flight = false;

        match result {
            Ok(snapshot) => {
                let published = self.store.replace_full(snapshot, now);
                let last_updated = self.store.last_updated().unwrap_or(now);
                self.state = SyncState::Ready;
                self.consecutive_failures = 0;
                self.last_error = None;
                info!(state = ?self.state, "Full snapshot loaded");

                let mut effects = vec![Effect::NotifySnapshot(published, last_updated)];
                if !self.scheduler_started {
                    self.scheduler_started = true;
                    effects.push(Effect::StartScheduler);
                }
                effects
            }
            Err(err) => {
                error!(error = %err, kind = ?err.kind(), "Full fetch failed");
                let info = err.to_info(FetchKind::Full, now);
                self.state = SyncState::Error;
                self.last_error = Some(info.clone());
                vec![Effect::NotifyError(info)]
            }
        }
    }

    /// Decide whether a scheduler tick issues a partial fetch.
    pub fn tick(&mut self) -> TickOutcome {
        let reason = if !self.alive {
            SkipReason::TornDown
        } else if self.state != SyncState::Ready {
            SkipReason::NotReady
        } else if self.paused {
            SkipReason::Paused
        } else if self.partial_in_flight {
            SkipReason::InFlight
        } else {
            self.partial_in_flight = true;
            return TickOutcome::Fetch(FetchTicket {
                kind: FetchKind::Partial,
                epoch: self.epoch,
            });
        };
        debug!(?reason, "Tick skipped");
        TickOutcome::Skipped(reason)
    }

    /// Apply the outcome of a partial fetch.
    ///
    /// Failures never leave `Ready`; they only bump the failure counter.
    pub fn complete_partial(
        &mut self,
        ticket: FetchTicket,
        result: Result<VolatileSnapshot>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if !self.accepts(ticket, FetchKind::Partial) {
            return Vec::new();
        }
        self.partial_in_flight = false;

        if ticket.epoch != self.epoch || self.state != SyncState::Ready {
            debug!(state = ?self.state, "Partial result superseded by full fetch");
            return Vec::new();
        }

        match result.and_then(|partial| self.store.merge_partial(&partial, now)) {
            Ok(published) => {
                if self.consecutive_failures > 0 {
                    info!(
                        failures = self.consecutive_failures,
                        "Volatile refresh recovered"
                    );
                }
                self.consecutive_failures = 0;
                if matches!(&self.last_error, Some(e) if e.fetch == FetchKind::Partial) {
                    self.last_error = None;
                }
                let last_updated = self.store.last_updated().unwrap_or(now);
                vec![Effect::NotifySnapshot(published, last_updated)]
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    error = %err,
                    failures = self.consecutive_failures,
                    "Volatile refresh failed, keeping previous snapshot"
                );
                self.last_error = Some(err.to_info(FetchKind::Partial, now));
                Vec::new()
            }
        }
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!("Background refresh paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            info!("Background refresh resumed");
        }
    }

    /// Release all state. Later fetch completions are ignored.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if !self.alive {
            return Vec::new();
        }
        self.alive = false;
        self.store.clear();
        info!("Sync controller torn down");

        if self.scheduler_started {
            self.scheduler_started = false;
            vec![Effect::StopScheduler]
        } else {
            Vec::new()
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(SyncError::Cancelled)
        }
    }

    fn accepts(&self, ticket: FetchTicket, kind: FetchKind) -> bool {
        if !self.alive {
            debug!(?kind, "Discarding fetch result after teardown");
            return false;
        }
        if ticket.kind != kind || !self.in_flight(kind) {
            debug!(?kind, "Discarding unexpected fetch result");
            return false;
        }
        true
    }
}
