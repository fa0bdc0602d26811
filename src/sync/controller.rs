//! The sync controller actor and its handle.
//!
//! All mutation of the store and the state flags happens on a single task
//! owning a [`SyncMachine`]. Intents arrive over a command channel from
//! [`SyncHandle`]s; ticks and fetch completions arrive over an internal event
//! channel. Fetches run on their own tasks so a slow source never blocks
//! pause, resume or teardown.

use super::machine::{Effect, FetchTicket, TickOutcome};
use super::{Renderer, Scheduler, SyncConfig, SyncMachine, SyncState};
use crate::error::{ErrorInfo, Result, SyncError};
use crate::metrics::data::{Snapshot, VolatileSnapshot};
use crate::metrics::TelemetrySource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Point-in-time view of the controller, published after every change.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub paused: bool,
    pub snapshot: Option<Arc<Snapshot>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<ErrorInfo>,
    pub scheduler_running: bool,
    /// False once the controller has been torn down
    pub alive: bool,
    pub stale_after: Duration,
}

impl SyncStatus {
    fn initial(stale_after: Duration) -> Self {
        Self {
            state: SyncState::Uninitialized,
            paused: false,
            snapshot: None,
            last_updated: None,
            consecutive_failures: 0,
            last_error: None,
            scheduler_running: false,
            alive: true,
            stale_after,
        }
    }

    /// A loading indicator is shown only during full fetches.
    pub fn is_loading(&self) -> bool {
        self.state == SyncState::Loading
    }

    /// Whether the snapshot is older than the freshness budget at `now`.
    ///
    /// Depends only on `last_updated`, so it clears on the next successful
    /// tick regardless of how many ticks failed before.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let Some(last_updated) = self.last_updated else {
            return false;
        };
        match (now - last_updated).to_std() {
            Ok(age) => age > self.stale_after,
            // now is before last_updated
            Err(_) => false,
        }
    }
}

enum Command {
    Start,
    Pause,
    Resume,
    ManualRefresh,
    Stop,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<()>>,
}

enum Event {
    Tick,
    FullDone(FetchTicket, Result<Snapshot>),
    PartialDone(FetchTicket, Result<VolatileSnapshot>),
}

/// Owns the state machine, scheduler and renderer; runs as a spawned task.
pub struct SyncController {
    machine: SyncMachine,
    source: Arc<dyn TelemetrySource>,
    renderer: Box<dyn Renderer>,
    scheduler: Scheduler,
    config: SyncConfig,
    alive: Arc<AtomicBool>,
    commands: mpsc::Receiver<Request>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    status_tx: watch::Sender<SyncStatus>,
    announced: (SyncState, bool),
}

impl SyncController {
    /// Spawn a controller on the current tokio runtime.
    ///
    /// The controller stays `Uninitialized` until [`SyncHandle::start`] is
    /// called. Dropping every handle tears it down.
    pub fn spawn(
        source: Arc<dyn TelemetrySource>,
        renderer: Box<dyn Renderer>,
        config: SyncConfig,
    ) -> Result<SyncHandle> {
        config.validate()?;

        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::initial(config.stale_after()));

        let controller = Self {
            machine: SyncMachine::new(),
            source,
            renderer,
            scheduler: Scheduler::new(config.interval),
            config,
            alive: Arc::new(AtomicBool::new(true)),
            commands,
            events_tx,
            events_rx,
            status_tx,
            announced: (SyncState::Uninitialized, false),
        };
        tokio::spawn(controller.run());

        Ok(SyncHandle {
            commands: commands_tx,
            status: status_rx,
        })
    }

    async fn run(mut self) {
        debug!(interval_ms = self.config.interval.as_millis() as u64, "Sync controller running");
        loop {
            tokio::select! {
                request = self.commands.recv() => match request {
                    Some(Request { command, reply }) => {
                        let stop = matches!(command, Command::Stop);
                        let result = self.handle_command(command);
                        self.publish();
                        let _ = reply.send(result);
                        if stop {
                            break;
                        }
                    }
                    None => {
                        debug!("All sync handles dropped");
                        self.teardown();
                        self.publish();
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                    self.publish();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Start => {
                let ticket = self.machine.start()?;
                self.spawn_full(ticket);
            }
            Command::ManualRefresh => {
                let ticket = self.machine.manual_refresh()?;
                self.spawn_full(ticket);
            }
            Command::Pause => self.machine.pause(),
            Command::Resume => self.machine.resume(),
            Command::Stop => self.teardown(),
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        let effects = match event {
            Event::Tick => {
                if let TickOutcome::Fetch(ticket) = self.machine.tick() {
                    self.spawn_partial(ticket);
                }
                Vec::new()
            }
            Event::FullDone(ticket, result) => self.machine.complete_full(ticket, result, Utc::now()),
            Event::PartialDone(ticket, result) => {
                self.machine.complete_partial(ticket, result, Utc::now())
            }
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::NotifySnapshot(snapshot, last_updated) => {
                    self.renderer.on_snapshot_changed(&snapshot, last_updated);
                }
                Effect::NotifyError(info) => self.renderer.on_error(&info),
                Effect::StartScheduler => {
                    let events = self.events_tx.clone();
                    self.scheduler.start(move || events.send(Event::Tick).is_ok());
                    info!(
                        interval_ms = self.config.interval.as_millis() as u64,
                        "Background refresh scheduled"
                    );
                }
                Effect::StopScheduler => self.scheduler.stop(),
            }
        }
    }

    fn teardown(&mut self) {
        self.alive.store(false, Ordering::Release);
        let effects = self.machine.teardown();
        self.apply(effects);
        // The scheduler may never have been started by the machine.
        self.scheduler.stop();
    }

    fn spawn_full(&self, ticket: FetchTicket) {
        let source = self.source.clone();
        self.spawn_fetch(ticket, async move { source.full_snapshot().await }, Event::FullDone);
    }

    fn spawn_partial(&self, ticket: FetchTicket) {
        let source = self.source.clone();
        self.spawn_fetch(
            ticket,
            async move { source.volatile_snapshot().await },
            Event::PartialDone,
        );
    }

    fn spawn_fetch<T, F>(
        &self,
        ticket: FetchTicket,
        fetch: F,
        done: fn(FetchTicket, Result<T>) -> Event,
    ) where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let alive = self.alive.clone();
        let timeout = self.config.fetch_timeout;
        let kind = ticket.kind();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::timeout(format!(
                    "{:?} fetch gave no response within {:?}",
                    kind, timeout
                ))),
            };
            if !alive.load(Ordering::Acquire) {
                debug!(?kind, "Fetch resolved after teardown, dropping result");
                return;
            }
            let _ = events.send(done(ticket, result));
        });
    }

    fn publish(&mut self) {
        let state = self.machine.state();
        let paused = self.machine.is_paused();
        if self.announced != (state, paused) && self.machine.is_alive() {
            self.announced = (state, paused);
            self.renderer.on_state_changed(state, paused);
        }

        let store = self.machine.store();
        self.status_tx.send_replace(SyncStatus {
            state,
            paused,
            snapshot: store.snapshot(),
            last_updated: store.last_updated(),
            consecutive_failures: self.machine.consecutive_failures(),
            last_error: self.machine.last_error().cloned(),
            scheduler_running: self.scheduler.is_running(),
            alive: self.machine.is_alive(),
            stale_after: self.config.stale_after(),
        });
    }
}

/// Cloneable handle issuing user intents to a [`SyncController`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Request>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Issue the initial full fetch. Valid only once, from `Uninitialized`.
    pub async fn start(&self) -> Result<()> {
        self.send(Command::Start).await
    }

    /// Stop applying ticks; the scheduler keeps running.
    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(Command::Resume).await
    }

    /// Full re-fetch; doubles as retry after an error. Rejected while loading.
    pub async fn manual_refresh(&self) -> Result<()> {
        self.send(Command::ManualRefresh).await
    }

    /// Tear the controller down. Safe to call more than once.
    pub async fn stop(&self) -> Result<()> {
        match self.send(Command::Stop).await {
            Err(SyncError::Cancelled) => Ok(()),
            other => other,
        }
    }

    /// Latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| SyncError::Cancelled)?;
        response.await.map_err(|_| SyncError::Cancelled)?
    }
}
