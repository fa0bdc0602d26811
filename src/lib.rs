//! # specdash - Live System Telemetry Synchronization
//!
//! Keeps a dashboard's view of a machine fresh without re-reading everything:
//! a full hardware/software snapshot is loaded once, then only the volatile
//! fields (CPU load, CPU temperature, memory usage) are polled and merged.
//!
//! ## Features
//!
//! - **Single-flight fetching**: at most one full and one partial fetch outstanding
//! - **Non-fatal polling**: failed polls keep the last good view and are counted
//! - **Pause/resume and manual refresh** without re-arming the scheduler
//! - **Local and remote sources**: sysinfo collector or an HTTP endpoint
//! - **Telemetry server**: expose the local machine at `/api/specs`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use specdash::{NullRenderer, SyncConfig, SyncController, SystemCollector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(SystemCollector::new()?);
//!     let handle = SyncController::spawn(source, Box::new(NullRenderer), SyncConfig::default())?;
//!     handle.start().await?;
//!
//!     let status = handle.status();
//!     println!("{:?}", status.state);
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod sync;
pub mod web;

// Re-export public API
pub use error::{ErrorInfo, ErrorKind, Result, SyncError};
pub use metrics::{
    collector::SystemCollector,
    data::{
        CpuInfo, GraphicsController, GraphicsInfo, MemoryInfo, OsInfo, Snapshot, StorageDevice,
        VolatileCpu, VolatileSnapshot,
    },
    remote::HttpSource,
    traits::TelemetrySource,
};
pub use sync::{
    FetchKind, NullRenderer, Renderer, SnapshotStore, SyncConfig, SyncController, SyncHandle,
    SyncState, SyncStatus,
};
pub use web::{start_web_server, WebConfig};

/// The default background polling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 15_000;

/// The default per-fetch timeout in milliseconds
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Snapshots older than this many intervals are reported stale
pub const DEFAULT_STALE_FACTOR: u32 = 2;

/// The default telemetry server port
pub const DEFAULT_WEB_PORT: u16 = 5000;
