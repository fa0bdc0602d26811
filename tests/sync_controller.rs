//! Controller behavior against a scripted telemetry source.
//!
//! Every test runs with tokio's clock paused, so scheduler ticks fire as soon
//! as the runtime is otherwise idle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use specdash::{
    CpuInfo, ErrorInfo, ErrorKind, FetchKind, MemoryInfo, Renderer, Result, Snapshot, SyncConfig,
    SyncController, SyncError, SyncHandle, SyncState, SyncStatus, TelemetrySource, VolatileCpu,
    VolatileSnapshot,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const INTERVAL: Duration = Duration::from_secs(15);
const GB: u64 = 1_000_000_000;

struct ScriptedSource {
    full: Mutex<VecDeque<Result<Snapshot>>>,
    partial: Mutex<VecDeque<Result<VolatileSnapshot>>>,
    full_gate: Semaphore,
    partial_gate: Semaphore,
    full_calls: AtomicUsize,
    partial_calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(
        full: Vec<Result<Snapshot>>,
        partial: Vec<Result<VolatileSnapshot>>,
    ) -> Arc<Self> {
        Self::build(full, partial, None)
    }

    /// Like `new`, but fetches of `kind` block until `release` is called.
    fn gated(
        kind: FetchKind,
        full: Vec<Result<Snapshot>>,
        partial: Vec<Result<VolatileSnapshot>>,
    ) -> Arc<Self> {
        Self::build(full, partial, Some(kind))
    }

    fn build(
        full: Vec<Result<Snapshot>>,
        partial: Vec<Result<VolatileSnapshot>>,
        gated: Option<FetchKind>,
    ) -> Arc<Self> {
        let gate = |kind| {
            if gated == Some(kind) {
                Semaphore::new(0)
            } else {
                Semaphore::new(Semaphore::MAX_PERMITS)
            }
        };
        Arc::new(Self {
            full: Mutex::new(full.into()),
            partial: Mutex::new(partial.into()),
            full_gate: gate(FetchKind::Full),
            partial_gate: gate(FetchKind::Partial),
            full_calls: AtomicUsize::new(0),
            partial_calls: AtomicUsize::new(0),
        })
    }

    fn release(&self, kind: FetchKind) {
        match kind {
            FetchKind::Full => self.full_gate.add_permits(1),
            FetchKind::Partial => self.partial_gate.add_permits(1),
        }
    }

    fn calls(&self, kind: FetchKind) -> usize {
        match kind {
            FetchKind::Full => self.full_calls.load(Ordering::SeqCst),
            FetchKind::Partial => self.partial_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn full_snapshot(&self) -> Result<Snapshot> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        self.full_gate
            .acquire()
            .await
            .map_err(|_| SyncError::Cancelled)?
            .forget();
        self.full
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(full_snapshot("X")))
    }

    async fn volatile_snapshot(&self) -> Result<VolatileSnapshot> {
        self.partial_calls.fetch_add(1, Ordering::SeqCst);
        self.partial_gate
            .acquire()
            .await
            .map_err(|_| SyncError::Cancelled)?
            .forget();
        self.partial
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::source_unavailable("script exhausted")))
    }
}

#[derive(Debug, Clone)]
enum Rendered {
    Snapshot(Snapshot),
    Error(ErrorInfo),
    State(SyncState, bool),
}

#[derive(Clone, Default)]
struct RecordingRenderer {
    events: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingRenderer {
    fn snapshots(&self) -> Vec<Snapshot> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Rendered::Snapshot(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<ErrorInfo> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Rendered::Error(info) => Some(info.clone()),
                _ => None,
            })
            .collect()
    }

    fn states(&self) -> Vec<(SyncState, bool)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Rendered::State(state, paused) => Some((*state, *paused)),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn on_snapshot_changed(&mut self, snapshot: &Snapshot, _last_updated: DateTime<Utc>) {
        self.events
            .lock()
            .unwrap()
            .push(Rendered::Snapshot(snapshot.clone()));
    }

    fn on_error(&mut self, error: &ErrorInfo) {
        self.events.lock().unwrap().push(Rendered::Error(error.clone()));
    }

    fn on_state_changed(&mut self, state: SyncState, paused: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Rendered::State(state, paused));
    }
}

fn full_snapshot(brand: &str) -> Snapshot {
    Snapshot {
        cpu: CpuInfo {
            brand: brand.to_string(),
            temperature: Some(45.0),
            current_load: 10.0,
            ..CpuInfo::default()
        },
        memory: MemoryInfo {
            total: 16 * GB,
            used: 4 * GB,
            free: 12 * GB,
        },
        ..Snapshot::default()
    }
}

fn volatile(temperature: f64, load: f64, used: u64) -> VolatileSnapshot {
    VolatileSnapshot {
        cpu: Some(VolatileCpu {
            temperature: Some(temperature),
            current_load: Some(load),
        }),
        memory: Some(MemoryInfo {
            total: 16 * GB,
            used,
            free: 16 * GB - used,
        }),
    }
}

fn config() -> SyncConfig {
    SyncConfig::new(INTERVAL).with_fetch_timeout(Duration::from_secs(1000))
}

fn spawn(source: Arc<ScriptedSource>, config: SyncConfig) -> (SyncHandle, RecordingRenderer) {
    let renderer = RecordingRenderer::default();
    let handle = SyncController::spawn(source, Box::new(renderer.clone()), config)
        .expect("valid config");
    (handle, renderer)
}

async fn wait_until(handle: &SyncHandle, pred: impl Fn(&SyncStatus) -> bool) -> SyncStatus {
    let mut rx = handle.subscribe();
    let status = tokio::time::timeout(Duration::from_secs(3600), rx.wait_for(|s| pred(s)))
        .await
        .expect("condition not reached")
        .expect("controller stopped publishing");
    (*status).clone()
}

fn memory_used(status: &SyncStatus) -> Option<u64> {
    status.snapshot.as_ref().map(|s| s.memory.used)
}

#[tokio::test(start_paused = true)]
async fn test_tick_merges_volatile_fields_only() {
    let source = ScriptedSource::new(
        vec![Ok(full_snapshot("X"))],
        vec![Ok(volatile(50.0, 15.0, 5 * GB))],
    );
    let (handle, renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();

    let ready = wait_until(&handle, |s| s.state == SyncState::Ready).await;
    assert!(ready.scheduler_running);
    assert_eq!(memory_used(&ready), Some(4 * GB));

    let merged = wait_until(&handle, |s| memory_used(s) == Some(5 * GB)).await;
    let snapshot = merged.snapshot.unwrap();
    assert_eq!(snapshot.cpu.brand, "X");
    assert_eq!(snapshot.cpu.temperature, Some(50.0));
    assert_eq!(snapshot.cpu.current_load, 15.0);
    assert_eq!(merged.state, SyncState::Ready);
    assert!(merged.last_updated >= ready.last_updated);

    assert_eq!(source.calls(FetchKind::Full), 1);
    assert_eq!(renderer.snapshots().len(), 2);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_initial_timeout_then_manual_refresh() {
    let source = ScriptedSource::new(
        vec![Err(SyncError::timeout("no answer")), Ok(full_snapshot("X"))],
        vec![Ok(volatile(50.0, 15.0, 5 * GB))],
    );
    let (handle, renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();

    let failed = wait_until(&handle, |s| s.state == SyncState::Error).await;
    assert!(!failed.scheduler_running);
    assert!(failed.snapshot.is_none());
    assert_eq!(failed.last_error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert_eq!(renderer.errors().len(), 1);

    handle.manual_refresh().await.unwrap();
    let ready = wait_until(&handle, |s| s.state == SyncState::Ready).await;
    assert!(ready.scheduler_running);
    assert!(ready.last_error.is_none());

    let merged = wait_until(&handle, |s| memory_used(s) == Some(5 * GB)).await;
    assert_eq!(merged.snapshot.unwrap().cpu.brand, "X");
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_three_tick_failures_then_recovery() {
    let source = ScriptedSource::new(
        vec![Ok(full_snapshot("X"))],
        vec![
            Err(SyncError::source_unavailable("refused")),
            Err(SyncError::timeout("slow")),
            Err(SyncError::schema_mismatch("bad body")),
            Ok(volatile(48.0, 20.0, 6 * GB)),
        ],
    );
    let (handle, renderer) = spawn(source, config());
    handle.start().await.unwrap();

    let failing = wait_until(&handle, |s| s.consecutive_failures == 3).await;
    assert_eq!(failing.state, SyncState::Ready);
    assert_eq!(memory_used(&failing), Some(4 * GB));
    let last_good = failing.last_updated.unwrap();
    assert!(failing.is_stale(last_good + chrono::Duration::seconds(31)));

    let recovered = wait_until(&handle, |s| memory_used(s) == Some(6 * GB)).await;
    assert_eq!(recovered.consecutive_failures, 0);
    assert!(recovered.last_error.is_none());
    assert!(!recovered.is_stale(Utc::now()));

    // Tick failures never reach the renderer's error channel.
    assert!(renderer.errors().is_empty());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_paused_ticks_do_not_mutate() {
    let source = ScriptedSource::new(
        vec![Ok(full_snapshot("X"))],
        vec![Ok(volatile(50.0, 15.0, 5 * GB))],
    );
    let (handle, _renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();

    let ready = wait_until(&handle, |s| s.state == SyncState::Ready).await;
    handle.pause().await.unwrap();

    tokio::time::sleep(INTERVAL * 6).await;
    let paused = handle.status();
    assert!(paused.paused);
    assert!(paused.scheduler_running);
    assert_eq!(source.calls(FetchKind::Partial), 0);
    assert!(Arc::ptr_eq(
        paused.snapshot.as_ref().unwrap(),
        ready.snapshot.as_ref().unwrap()
    ));
    assert_eq!(paused.last_updated, ready.last_updated);

    handle.resume().await.unwrap();
    let merged = wait_until(&handle, |s| memory_used(s) == Some(5 * GB)).await;
    assert!(!merged.paused);
    assert_eq!(source.calls(FetchKind::Partial), 1);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_ticks_issue_one_partial_fetch() {
    let source = ScriptedSource::gated(
        FetchKind::Partial,
        vec![Ok(full_snapshot("X"))],
        vec![Ok(volatile(50.0, 15.0, 5 * GB))],
    );
    let (handle, _renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();
    wait_until(&handle, |s| s.state == SyncState::Ready).await;

    tokio::time::sleep(INTERVAL * 6).await;
    assert_eq!(source.calls(FetchKind::Partial), 1);

    source.release(FetchKind::Partial);
    wait_until(&handle, |s| memory_used(s) == Some(5 * GB)).await;
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rejected_while_loading() {
    let source = ScriptedSource::gated(FetchKind::Full, vec![Ok(full_snapshot("X"))], vec![]);
    let (handle, _renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();
    assert!(handle.status().is_loading());

    let err = handle.manual_refresh().await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyInFlight(FetchKind::Full)));
    let err = handle.start().await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidTransition { .. }));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls(FetchKind::Full), 1);

    source.release(FetchKind::Full);
    let ready = wait_until(&handle, |s| s.state == SyncState::Ready).await;
    assert!(!ready.is_loading());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_retains_last_good_snapshot() {
    let source = ScriptedSource::new(
        vec![
            Ok(full_snapshot("X")),
            Err(SyncError::source_unavailable("connection refused")),
        ],
        vec![],
    );
    let (handle, renderer) = spawn(source, config());
    handle.start().await.unwrap();
    wait_until(&handle, |s| s.state == SyncState::Ready).await;

    handle.manual_refresh().await.unwrap();
    let failed = wait_until(&handle, |s| s.state == SyncState::Error).await;

    assert_eq!(failed.snapshot.unwrap().cpu.brand, "X");
    let errors = renderer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::SourceUnavailable);
    assert_eq!(errors[0].fetch, FetchKind::Full);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slow_full_fetch_times_out() {
    let source = ScriptedSource::gated(FetchKind::Full, vec![Ok(full_snapshot("X"))], vec![]);
    let config = config().with_fetch_timeout(Duration::from_secs(5));
    let (handle, _renderer) = spawn(source, config);
    handle.start().await.unwrap();

    let failed = wait_until(&handle, |s| s.state == SyncState::Error).await;
    assert_eq!(failed.last_error.unwrap().kind, ErrorKind::Timeout);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fetch_resolving_after_teardown_is_ignored() {
    let source = ScriptedSource::gated(FetchKind::Full, vec![Ok(full_snapshot("X"))], vec![]);
    let (handle, renderer) = spawn(source.clone(), config());
    handle.start().await.unwrap();
    handle.stop().await.unwrap();

    source.release(FetchKind::Full);
    tokio::time::sleep(INTERVAL * 4).await;

    let status = handle.status();
    assert!(!status.alive);
    assert!(status.snapshot.is_none());
    assert!(!status.scheduler_running);
    assert_ne!(status.state, SyncState::Ready);
    assert!(renderer.snapshots().is_empty());

    assert!(matches!(handle.manual_refresh().await, Err(SyncError::Cancelled)));
    assert!(handle.stop().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_loading_indicator_only_for_full_fetches() {
    let source = ScriptedSource::new(
        vec![Ok(full_snapshot("X"))],
        vec![
            Ok(volatile(50.0, 15.0, 5 * GB)),
            Ok(volatile(51.0, 16.0, 6 * GB)),
        ],
    );
    let (handle, renderer) = spawn(source, config());
    handle.start().await.unwrap();
    wait_until(&handle, |s| memory_used(s) == Some(6 * GB)).await;

    assert_eq!(
        renderer.states(),
        vec![(SyncState::Loading, false), (SyncState::Ready, false)]
    );
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_tears_down() {
    let source = ScriptedSource::new(vec![Ok(full_snapshot("X"))], vec![]);
    let (handle, _renderer) = spawn(source, config());
    handle.start().await.unwrap();
    wait_until(&handle, |s| s.state == SyncState::Ready).await;

    let mut rx = handle.subscribe();
    let clone = handle.clone();
    drop(handle);
    drop(clone);

    let status = rx.wait_for(|s| !s.alive).await.unwrap().clone();
    assert!(status.snapshot.is_none());
    assert!(status.last_updated.is_none());
    assert!(!status.is_stale(Utc::now() + chrono::Duration::hours(1)));
    assert!(!status.scheduler_running);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let source = ScriptedSource::new(vec![], vec![]);
    let result = SyncController::spawn(
        source,
        Box::new(RecordingRenderer::default()),
        SyncConfig::new(Duration::ZERO),
    );
    assert!(matches!(result, Err(SyncError::Config(_))));

    let result = SyncController::spawn(
        ScriptedSource::new(vec![], vec![]),
        Box::new(RecordingRenderer::default()),
        SyncConfig::new(Duration::MAX),
    );
    assert!(matches!(result, Err(SyncError::Config(_))));
}
