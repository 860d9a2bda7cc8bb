use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api_client::QuoteProvider;
use crate::domain::models::Snapshot;
use crate::domain::registry::HoldingRegistry;
use crate::error::FetchFailure;
use crate::usecases::compute_allocations::build_snapshot;
use crate::usecases::valuation::value_holdings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Read side of the scheduler, cheap to clone into request handlers.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<Snapshot>>,
    running: Arc<AtomicBool>,
}

impl SnapshotReader {
    /// The most recently published snapshot, or the empty cycle-0 snapshot
    /// before the first cycle completes.
    pub fn current(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }
}

#[cfg(test)]
impl RefreshScheduler {
    pub fn registry(&self) -> &HoldingRegistry {
        &self.registry
    }
}

#[cfg(test)]
impl SnapshotReader {
    pub async fn wait_for_cycle(&mut self, cycle: u64) -> Arc<Snapshot> {
        let waited = match self.rx.wait_for(|s| s.cycle >= cycle).await {
            Ok(snapshot) => Some(Arc::clone(&snapshot)),
            Err(_) => None,
        };
        waited.unwrap_or_else(|| self.current())
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub published: usize,
    pub failures: Vec<FetchFailure>,
}

// Marks the scheduler RUNNING for its lifetime; IDLE again on drop, including
// when the cycle future is cancelled.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives refresh cycles and owns the published snapshot.
///
/// The scheduler is the only owner of the holding registry, and cycles run
/// one after another on a single task, so quantities are never advanced by
/// two cycles at once.
pub struct RefreshScheduler {
    registry: HoldingRegistry,
    provider: Arc<dyn QuoteProvider>,
    interval: Duration,
    fetch_timeout: Duration,
    cycle: u64,
    running: Arc<AtomicBool>,
    publisher: watch::Sender<Arc<Snapshot>>,
}

impl RefreshScheduler {
    pub fn new(
        registry: HoldingRegistry,
        provider: Arc<dyn QuoteProvider>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> (Self, SnapshotReader) {
        let (publisher, rx) = watch::channel(Arc::new(Snapshot::empty()));
        let running = Arc::new(AtomicBool::new(false));
        let reader = SnapshotReader {
            rx,
            running: running.clone(),
        };
        let scheduler = Self {
            registry,
            provider,
            interval,
            fetch_timeout,
            cycle: 0,
            running,
            publisher,
        };
        (scheduler, reader)
    }

    /// Runs one cycle: advance quantities, fetch and value every holding
    /// concurrently, aggregate, then publish. Always publishes, even when
    /// every fetch failed.
    #[tracing::instrument(skip(self), fields(cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let _running = RunningGuard::enter(&self.running);
        let started = Instant::now();
        self.cycle += 1;

        self.registry.advance();
        let results = value_holdings(
            self.provider.as_ref(),
            self.registry.holdings(),
            self.fetch_timeout,
        )
        .await;

        let failures: Vec<FetchFailure> = results
            .iter()
            .filter_map(|r| r.as_ref().err().cloned())
            .collect();
        let snapshot = build_snapshot(self.cycle, results, Utc::now());
        let published = snapshot.records.len();

        info!(
            cycle = self.cycle,
            published,
            failed = failures.len(),
            total_market_value = %snapshot.total_market_value,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "portfolio snapshot published"
        );
        self.publisher.send_replace(Arc::new(snapshot));

        CycleReport {
            cycle: self.cycle,
            published,
            failures,
        }
    }

    /// Runs a cycle immediately, then one per interval until the task is
    /// dropped. Ticks that fall due while a cycle is still running are skipped.
    pub async fn run(mut self) {
        info!(
            holdings = self.registry.len(),
            interval_secs = self.interval.as_secs_f64(),
            fetch_timeout_secs = self.fetch_timeout.as_secs_f64(),
            "portfolio refresher started"
        );
        let mut ticker = interval_at(Instant::now(), self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let started = Instant::now();
            let report = self.run_cycle().await;
            if report.published == 0 && !report.failures.is_empty() {
                warn!(
                    cycle = report.cycle,
                    failed = report.failures.len(),
                    "no holding could be valued this cycle"
                );
            }

            let elapsed = started.elapsed();
            if elapsed >= self.interval {
                debug!(
                    cycle = report.cycle,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "cycle overran the refresh interval; skipping missed ticks"
                );
            }
        }
    }
}
