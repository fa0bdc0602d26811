//! Fixed-interval tick generation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Periodic trigger firing every `interval`, starting one interval after `start`.
///
/// `start` on a running scheduler and `stop` on a stopped one are no-ops.
/// Once `stop` returns no further ticks are delivered. Retry and backoff are
/// not handled here.
pub struct Scheduler {
    interval: Duration,
    running: Option<Running>,
}

struct Running {
    armed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the tick loop is still alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start delivering ticks to `on_tick`.
    ///
    /// The callback returns `false` when its receiver is gone, which ends the
    /// tick loop. Must be called from within a tokio runtime.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_running() {
            return;
        }
        // A loop that ended on its own leaves a finished handle behind.
        self.running = None;

        let period = self.interval;
        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(?period, "Interval too large to schedule, no ticks will fire");
            return;
        };

        let armed = Arc::new(AtomicBool::new(true));
        let task_armed = armed.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !task_armed.load(Ordering::Acquire) || !on_tick() {
                    break;
                }
            }
        });

        debug!(interval_ms = period.as_millis() as u64, "Scheduler started");
        self.running = Some(Running { armed, task });
    }

    /// Stop delivering ticks.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.armed.store(false, Ordering::Release);
            running.task.abort();
            debug!("Scheduler stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
