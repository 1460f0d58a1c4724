//! Poll loop
//!
//! Drives fetch → merge → publish on a fixed interval and on demand.
//!
//! Lifecycle: `Poller` (idle) is consumed by `start`, which returns a
//! `PollerHandle` (polling). `PollerHandle::stop` is terminal and idempotent.
//! Publication goes through a gate that `stop` closes, so once `stop`
//! returns nothing is published again, even by a fetch that was already in
//! flight.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PollerError;
use crate::fetcher::TelemetrySource;
use crate::merger::{self, MergeOptions};
use crate::models::DeviceView;

/// What triggered a poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOrigin {
    Periodic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

/// Published device collection. Replaced wholesale, never patched.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    pub devices: Arc<[DeviceView]>,
    /// 0 until the first successful cycle
    pub generation: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub origin: Option<CycleOrigin>,
    /// Failure of the latest cycle, cleared by the next successful one
    pub last_error: Option<String>,
}

impl FleetSnapshot {
    pub fn empty() -> Self {
        Self {
            devices: Arc::from(Vec::new()),
            generation: 0,
            fetched_at: None,
            origin: None,
            last_error: None,
        }
    }

    pub fn device(&self, name: &str) -> Option<&DeviceView> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// True until the first cycle has either published or failed
    pub fn is_loading(&self) -> bool {
        self.generation == 0 && self.last_error.is_none()
    }
}

/// Outcome of a published cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub generation: u64,
    pub devices: usize,
    pub with_usage: usize,
    pub orphaned_usage: usize,
}

struct Gate {
    stopped: bool,
    generation: u64,
}

struct Shared {
    id: Uuid,
    source: Arc<dyn TelemetrySource>,
    options: MergeOptions,
    publisher: watch::Sender<Arc<FleetSnapshot>>,
    gate: Mutex<Gate>,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.gate.lock().stopped
    }

    async fn run_cycle(&self, origin: CycleOrigin) -> Result<CycleReport, PollerError> {
        if self.is_stopped() {
            return Err(PollerError::Stopped);
        }

        let (inventory, usage) = match self.source.fetch_all().await {
            Ok(sets) => sets,
            Err(e) => {
                self.record_failure(&e.to_string());
                return Err(e.into());
            }
        };
        let devices = merger::merge(&inventory, &usage, self.options);

        let orphans = merger::orphaned_usage(&inventory, &usage);
        if !orphans.is_empty() {
            debug!("Dropping usage without inventory: {:?}", orphans);
        }

        self.publish(devices, origin, orphans.len())
    }

    fn publish(
        &self,
        devices: Vec<DeviceView>,
        origin: CycleOrigin,
        orphaned_usage: usize,
    ) -> Result<CycleReport, PollerError> {
        let mut gate = self.gate.lock();
        if gate.stopped {
            debug!(poller = %self.id, "Discarding {:?} cycle result after stop", origin);
            return Err(PollerError::Stopped);
        }
        gate.generation += 1;

        let report = CycleReport {
            generation: gate.generation,
            devices: devices.len(),
            with_usage: devices.iter().filter(|d| d.has_usage).count(),
            orphaned_usage,
        };
        self.publisher.send_replace(Arc::new(FleetSnapshot {
            devices: Arc::from(devices),
            generation: gate.generation,
            fetched_at: Some(Utc::now()),
            origin: Some(origin),
            last_error: None,
        }));
        Ok(report)
    }

    /// Keeps the published devices and generation, only flags the failure
    fn record_failure(&self, error: &str) {
        let gate = self.gate.lock();
        if gate.stopped {
            return;
        }
        self.publisher.send_modify(|current| {
            let mut flagged = FleetSnapshot::clone(current);
            flagged.last_error = Some(error.to_string());
            *current = Arc::new(flagged);
        });
    }

    fn close_gate(&self) -> bool {
        let mut gate = self.gate.lock();
        let was_open = !gate.stopped;
        gate.stopped = true;
        was_open
    }
}

/// Idle poller, not yet started
pub struct Poller {
    shared: Arc<Shared>,
}

impl Poller {
    pub fn new(source: Arc<dyn TelemetrySource>, options: MergeOptions) -> Self {
        let (publisher, _) = watch::channel(Arc::new(FleetSnapshot::empty()));
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                source,
                options,
                publisher,
                gate: Mutex::new(Gate { stopped: false, generation: 0 }),
            }),
        }
    }

    pub fn state(&self) -> PollerState {
        PollerState::Idle
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.shared.publisher.subscribe()
    }

    /// Runs one cycle immediately, then one per `interval`.
    /// Must be called from within a Tokio runtime.
    pub fn start(self, interval: Duration) -> PollerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        info!(poller = %self.shared.id, "Starting poller (interval {}s)", interval.as_secs_f32());

        let task = tokio::spawn(poll_loop(self.shared.clone(), interval, shutdown_rx));

        PollerHandle {
            shared: self.shared,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = shared.run_cycle(CycleOrigin::Periodic) => match result {
                Ok(report) => debug!(
                    "Published generation {} ({} devices, {} with usage)",
                    report.generation, report.devices, report.with_usage
                ),
                Err(PollerError::Stopped) => break,
                Err(e) => warn!("Background refresh failed, keeping previous data: {}", e),
            },
        }
    }
    debug!(poller = %shared.id, "Poll loop exited");
}

/// Running poller
pub struct PollerHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> PollerState {
        if self.shared.is_stopped() {
            PollerState::Stopped
        } else {
            PollerState::Polling
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.shared.publisher.subscribe()
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<FleetSnapshot> {
        self.shared.publisher.borrow().clone()
    }

    /// Out-of-band cycle. Does not touch the periodic timer; the outcome is
    /// returned so the caller can notify the user.
    pub async fn refresh_now(&self) -> Result<CycleReport, PollerError> {
        let result = self.shared.run_cycle(CycleOrigin::Manual).await;
        match &result {
            Ok(report) => info!(
                "Manual refresh published generation {} ({} devices)",
                report.generation, report.devices
            ),
            Err(e) => warn!("Manual refresh failed: {}", e),
        }
        result
    }

    /// Stop polling. No publish happens after this returns.
    pub async fn stop(&self) {
        if self.shared.close_gate() {
            info!(poller = %self.shared.id, "Stopping poller");
        }
        let _ = self.shutdown.send(true);

        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shared.close_gate();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Endpoint, FailureKind, FetchError};
    use crate::models::{InventorySet, UsageSet};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Fleet = (InventorySet, UsageSet);

    fn fleet(names: &[&str]) -> Fleet {
        let inventory = names.iter().map(|n| json!({"Name": n, "Status": "Online"})).collect();
        let usage = names.iter().map(|n| json!({"Name": n, "Used Memory": 1.0})).collect();
        (
            serde_json::from_value(serde_json::Value::Array(inventory)).unwrap(),
            serde_json::from_value(serde_json::Value::Array(usage)).unwrap(),
        )
    }

    fn unavailable() -> FetchError {
        FetchError::Status { endpoint: Endpoint::Usage, status: 503 }
    }

    /// One scripted fetch: optionally announces itself and waits for release
    struct Step {
        entered: Option<oneshot::Sender<()>>,
        release: Option<oneshot::Receiver<()>>,
        result: Result<Fleet, FetchError>,
    }

    impl Step {
        fn ready(result: Result<Fleet, FetchError>) -> Self {
            Self { entered: None, release: None, result }
        }

        fn gated(result: Result<Fleet, FetchError>) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            let step = Self { entered: Some(entered_tx), release: Some(release_rx), result };
            (step, entered_rx, release_tx)
        }
    }

    /// Plays steps in order, then fails every call
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self { steps: Mutex::new(steps.into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl TelemetrySource for ScriptedSource {
        async fn fetch_all(&self) -> Result<Fleet, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().pop_front();
            let Some(mut step) = step else {
                return Err(unavailable());
            };
            if let Some(entered) = step.entered.take() {
                let _ = entered.send(());
            }
            if let Some(release) = step.release.take() {
                let _ = release.await;
            }
            step.result
        }
    }

    #[tokio::test]
    async fn test_start_runs_immediate_cycle() {
        let source = ScriptedSource::new(vec![Step::ready(Ok(fleet(&["A", "B"])))]);
        let poller = Poller::new(source, MergeOptions::default());
        assert_eq!(poller.state(), PollerState::Idle);

        let mut rx = poller.subscribe();
        assert!(rx.borrow().is_loading());

        let handle = poller.start(Duration::from_secs(3600));
        let snapshot = rx.wait_for(|s| s.generation == 1).await.unwrap().clone();

        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.origin, Some(CycleOrigin::Periodic));
        assert!(snapshot.device("B").unwrap().has_usage);
        assert_eq!(handle.state(), PollerState::Polling);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_on_interval() {
        let source = ScriptedSource::new(vec![]);
        let handle = Poller::new(source.clone(), MergeOptions::default())
            .start(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_keeps_timer_phase() {
        let source = ScriptedSource::new(vec![]);
        let handle = Poller::new(source.clone(), MergeOptions::default())
            .start(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let _ = handle.refresh_now().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // t=9s: next tick not due yet
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // t=11s: tick still on the original 10s boundary, not pushed to 15s
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_first_cycle_ends_loading() {
        let source = ScriptedSource::new(vec![Step::ready(Err(unavailable())), Step::ready(Ok(fleet(&["A"])))]);
        let poller = Poller::new(source, MergeOptions::default());
        let mut rx = poller.subscribe();
        let handle = poller.start(Duration::from_secs(3600));

        let snapshot = rx.wait_for(|s| s.last_error.is_some()).await.unwrap().clone();
        assert!(!snapshot.is_loading());
        assert_eq!(snapshot.generation, 0);
        assert!(snapshot.last_error.as_deref().unwrap().contains("503"));

        handle.refresh_now().await.unwrap();
        let current = handle.current();
        assert_eq!(current.generation, 1);
        assert!(current.last_error.is_none());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_collection() {
        let source = ScriptedSource::new(vec![Step::ready(Ok(fleet(&["A"])))]);
        let poller = Poller::new(source, MergeOptions::default());
        let mut rx = poller.subscribe();
        let handle = poller.start(Duration::from_secs(3600));
        rx.wait_for(|s| s.generation == 1).await.unwrap();

        let err = handle.refresh_now().await.unwrap_err();
        match err {
            PollerError::Fetch(e) => assert_eq!(e.kind(), FailureKind::Network),
            other => panic!("unexpected error: {other}"),
        }

        let current = handle.current();
        assert_eq!(current.generation, 1);
        assert_eq!(current.devices[0].name, "A");
        assert!(current.last_error.is_some());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_manual_refresh_reports_success() {
        let source = ScriptedSource::new(vec![
            Step::ready(Ok(fleet(&["A"]))),
            Step::ready(Ok(fleet(&["A", "B", "C"]))),
        ]);
        let poller = Poller::new(source, MergeOptions::default());
        let mut rx = poller.subscribe();
        let handle = poller.start(Duration::from_secs(3600));
        rx.wait_for(|s| s.generation == 1).await.unwrap();

        let report = handle.refresh_now().await.unwrap();
        assert_eq!(report, CycleReport { generation: 2, devices: 3, with_usage: 3, orphaned_usage: 0 });
        assert_eq!(handle.current().origin, Some(CycleOrigin::Manual));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_no_publish_after_stop_even_for_inflight_fetch() {
        let (periodic, periodic_entered, _periodic_release) = Step::gated(Ok(fleet(&["P"])));
        let (manual, manual_entered, manual_release) = Step::gated(Ok(fleet(&["M"])));
        let source = ScriptedSource::new(vec![periodic, manual]);

        let poller = Poller::new(source, MergeOptions::default());
        let rx = poller.subscribe();
        let handle = Arc::new(poller.start(Duration::from_secs(3600)));
        periodic_entered.await.unwrap();

        let refresher = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.refresh_now().await })
        };
        manual_entered.await.unwrap();

        handle.stop().await;
        assert_eq!(handle.state(), PollerState::Stopped);

        manual_release.send(()).unwrap();
        let outcome = refresher.await.unwrap();
        assert!(matches!(outcome, Err(PollerError::Stopped)));

        assert!(!rx.has_changed().unwrap_or(false));
        assert_eq!(handle.current().generation, 0);
        assert!(handle.current().devices.is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_terminal() {
        let source = ScriptedSource::new(vec![Step::ready(Ok(fleet(&["A"])))]);
        let poller = Poller::new(source, MergeOptions::default());
        let mut rx = poller.subscribe();
        let handle = poller.start(Duration::from_secs(3600));
        rx.wait_for(|s| s.generation == 1).await.unwrap();

        handle.stop().await;
        handle.stop().await;
        assert_eq!(handle.state(), PollerState::Stopped);
        assert!(matches!(handle.refresh_now().await, Err(PollerError::Stopped)));
        assert_eq!(handle.current().generation, 1);
    }

    #[tokio::test]
    async fn test_last_completed_cycle_wins() {
        let (periodic, periodic_entered, periodic_release) = Step::gated(Ok(fleet(&["P1", "P2"])));
        let manual = Step::ready(Ok(fleet(&["M"])));
        let source = ScriptedSource::new(vec![periodic, manual]);

        let poller = Poller::new(source, MergeOptions::default());
        let mut rx = poller.subscribe();
        let handle = poller.start(Duration::from_secs(3600));
        periodic_entered.await.unwrap();

        let report = handle.refresh_now().await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(handle.current().devices[0].name, "M");

        periodic_release.send(()).unwrap();
        let snapshot = rx.wait_for(|s| s.generation == 2).await.unwrap().clone();
        let names: Vec<&str> = snapshot.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["P1", "P2"]);
        assert_eq!(snapshot.origin, Some(CycleOrigin::Periodic));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_dropping_handle_closes_gate() {
        let (periodic, periodic_entered, periodic_release) = Step::gated(Ok(fleet(&["late"])));
        let source = ScriptedSource::new(vec![periodic]);
        let poller = Poller::new(source, MergeOptions::default());
        let rx = poller.subscribe();

        let handle = poller.start(Duration::from_secs(3600));
        periodic_entered.await.unwrap();
        drop(handle);

        let _ = periodic_release.send(());
        tokio::task::yield_now().await;
        assert_eq!(rx.borrow().generation, 0);
    }
}
