//! Analysis run lifecycle.
//!
//! A run moves `Idle -> Running -> {Succeeded, Failed} -> Idle`. Each run
//! executes on its own tokio task and reports exactly one
//! [`RunNotification`] over an mpsc channel, unless the coordinator is
//! shut down while it is in flight.

pub mod store;

pub use store::{AnalysisStore, Snapshot};

use crate::analysis::{RegionalRiskMapper, RiskScorer};
use crate::catalog::{fetch_with_retry, EventSource, RetryPolicy};
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, BoundingBox, Region, TimeWindow};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const NOTIFICATION_CAPACITY: usize = 16;

/// Inputs of one run.
#[derive(Clone)]
pub struct AnalysisRequest {
    pub scorer: Arc<RiskScorer>,
    pub regions: Arc<[Region]>,
    pub window: TimeWindow,
    /// Percentage at or above which the run raises an alert.
    pub alert_threshold: f64,
}

/// Settings shared by every run of a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub national_bbox: BoundingBox,
    /// Maximum regional fetches in flight.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a whole run; `None` disables it.
    pub run_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded(Arc<AnalysisResult>),
    Failed(String),
}

/// Delivered once per completed run.
#[derive(Debug, Clone)]
pub struct RunNotification {
    pub run_id: u64,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("an analysis run is already in progress")]
    AlreadyRunning,

    #[error("the analysis coordinator has been shut down")]
    ShutDown,
}

#[derive(Default)]
struct Lifecycle {
    running: AtomicBool,
    shut_down: AtomicBool,
    last_run_id: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Returns the coordinator to `Idle` when the run task ends or is aborted.
struct RunGuard(Arc<Lifecycle>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

/// Starts runs, enforces that at most one is in flight, and publishes
/// results to the [`AnalysisStore`].
pub struct AnalysisCoordinator {
    source: Arc<dyn EventSource>,
    settings: CoordinatorSettings,
    store: Arc<AnalysisStore>,
    lifecycle: Arc<Lifecycle>,
    notify: mpsc::Sender<RunNotification>,
}

impl AnalysisCoordinator {
    /// Create a coordinator and the receiving end of its notifications.
    pub fn new(
        source: Arc<dyn EventSource>,
        settings: CoordinatorSettings,
        store: Arc<AnalysisStore>,
    ) -> (Self, mpsc::Receiver<RunNotification>) {
        let (notify, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        let coordinator = Self {
            source,
            settings,
            store,
            lifecycle: Arc::new(Lifecycle::default()),
            notify,
        };
        (coordinator, rx)
    }

    pub fn state(&self) -> RunState {
        if self.lifecycle.running.load(Ordering::SeqCst) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn store(&self) -> &Arc<AnalysisStore> {
        &self.store
    }

    /// Start a run in the background and return its id.
    pub fn start(&self, request: AnalysisRequest) -> Result<u64, StartError> {
        if self.lifecycle.shut_down.load(Ordering::SeqCst) {
            return Err(StartError::ShutDown);
        }
        if self
            .lifecycle
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }

        let guard = RunGuard(self.lifecycle.clone());
        let run_id = self.lifecycle.last_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Starting analysis run {} for {}", run_id, request.window);

        let source = self.source.clone();
        let settings = self.settings.clone();
        let store = self.store.clone();
        let lifecycle = self.lifecycle.clone();
        let notify = self.notify.clone();

        let handle = tokio::spawn(async move {
            let outcome = execute_with_timeout(source, &settings, &request)
                .await
                .map(Arc::new);

            // Wait for channel space first so nothing below awaits
            let permit = notify.reserve().await.ok();

            // `shutdown()` flips the flag under this lock, so a run either
            // finishes publishing before it returns or not at all
            let _task = lifecycle.task.lock().unwrap_or_else(PoisonError::into_inner);
            if lifecycle.shut_down.load(Ordering::SeqCst) {
                debug!("Discarding result of run {} after shutdown", run_id);
                return;
            }

            let outcome = match outcome {
                Ok(result) => {
                    let generation = store.publish(result.clone());
                    info!(
                        "Run {} succeeded: overall risk {:.1}% (generation {})",
                        run_id, result.overall_risk, generation
                    );
                    RunOutcome::Succeeded(result)
                }
                Err(e) => {
                    error!("Run {} failed: {}", run_id, e);
                    RunOutcome::Failed(e.to_string())
                }
            };

            drop(guard);
            match permit {
                Some(permit) => permit.send(RunNotification { run_id, outcome }),
                None => debug!("No receiver for the notification of run {}", run_id),
            }
        });

        *self
            .lifecycle
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(run_id)
    }

    /// Refuse further runs and abort the one in flight, if any.
    ///
    /// An aborted run neither publishes nor notifies.
    pub fn shutdown(&self) {
        let task = {
            let mut task = self
                .lifecycle
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.lifecycle.shut_down.store(true, Ordering::SeqCst);
            task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
        info!("Analysis coordinator shut down");
    }
}

async fn execute_with_timeout(
    source: Arc<dyn EventSource>,
    settings: &CoordinatorSettings,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, AnalysisError> {
    let run = execute(source, settings, request);
    match settings.run_timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or(Err(AnalysisError::TimedOut {
                seconds: limit.as_secs(),
            })),
        None => run.await,
    }
}

/// Nationwide fetch and score, then the regional sweep.
async fn execute(
    source: Arc<dyn EventSource>,
    settings: &CoordinatorSettings,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, AnalysisError> {
    let started = Instant::now();

    let events = fetch_with_retry(
        source.as_ref(),
        &request.window,
        &settings.national_bbox,
        settings.retry,
    )
    .await?;

    if events.is_empty() {
        return Err(AnalysisError::NoEvents {
            window: request.window.to_string(),
        });
    }

    let overall_risk = request.scorer.score_events(&events)?;
    info!(
        "Nationwide risk {:.1}% from {} events",
        overall_risk,
        events.len()
    );

    let mapper = RegionalRiskMapper::new(source, settings.concurrency, settings.retry);
    let regions = mapper
        .map_risk(&request.scorer, &request.regions, &request.window)
        .await?;

    Ok(AnalysisResult {
        overall_risk,
        alert_threshold: request.alert_threshold,
        alert: overall_risk >= request.alert_threshold,
        window: request.window,
        events,
        regions,
        completed_at: Utc::now(),
        duration_seconds: started.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scorer::testing::magnitude_scorer;
    use crate::catalog::testing::{event, ScriptedSource};
    use crate::error::FetchError;
    use crate::models::RegionRisk;
    use geo::{LineString, MultiPolygon, Polygon};

    const NATIONAL: BoundingBox = BoundingBox {
        min_latitude: 36.0,
        max_latitude: 42.5,
        min_longitude: 26.0,
        max_longitude: 45.5,
    };

    fn region(name: &str, min_lon: f64) -> Region {
        let ring = LineString::from(vec![
            (min_lon, 37.0),
            (min_lon + 1.0, 37.0),
            (min_lon + 1.0, 38.0),
            (min_lon, 37.0),
        ]);
        Region::new(name, MultiPolygon(vec![Polygon::new(ring, vec![])])).unwrap()
    }

    fn settings(run_timeout: Option<Duration>) -> CoordinatorSettings {
        CoordinatorSettings {
            national_bbox: NATIONAL,
            concurrency: 2,
            retry: RetryPolicy::none(),
            run_timeout,
        }
    }

    /// Nationwide: M5 and M3. Region at lon 30: M7. Region at lon 40: fails.
    fn script(bbox: &BoundingBox) -> Result<Vec<crate::models::Event>, FetchError> {
        if *bbox == NATIONAL {
            return Ok(vec![event(5.0, 10.0), event(3.0, 8.0)]);
        }
        match bbox.min_longitude as i32 {
            30 => Ok(vec![event(7.0, 12.0)]),
            40 => Err(FetchError::Status {
                status: 404,
                body: String::new(),
            }),
            _ => Ok(vec![]),
        }
    }

    fn setup(
        source: ScriptedSource,
        run_timeout: Option<Duration>,
    ) -> (
        AnalysisCoordinator,
        mpsc::Receiver<RunNotification>,
        AnalysisRequest,
    ) {
        let store = Arc::new(AnalysisStore::new(vec![
            region("Bursa", 30.0),
            region("Erzurum", 40.0),
            region("Rize", 41.0),
        ]));
        let request = AnalysisRequest {
            scorer: magnitude_scorer(),
            regions: store.regions(),
            window: TimeWindow::trailing_days(Utc::now(), 30).unwrap(),
            alert_threshold: 35.0,
        };
        let (coordinator, rx) =
            AnalysisCoordinator::new(Arc::new(source), settings(run_timeout), store);
        (coordinator, rx, request)
    }

    async fn next(rx: &mut mpsc::Receiver<RunNotification>) -> RunNotification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification within 5s")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_successful_run_publishes_and_notifies() {
        let (coordinator, mut rx, request) = setup(ScriptedSource::new(script), None);

        let run_id = coordinator.start(request).unwrap();
        let notification = next(&mut rx).await;
        assert_eq!(notification.run_id, run_id);

        let result = match notification.outcome {
            RunOutcome::Succeeded(result) => result,
            RunOutcome::Failed(reason) => panic!("run failed: {}", reason),
        };
        assert!((result.overall_risk - 40.0).abs() < 1e-9);
        assert!(result.alert);
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.regions.len(), 3);
        assert!((result.regions["Bursa"].value() - 70.0).abs() < 1e-9);
        assert!(result.regions["Erzurum"].is_unavailable());
        assert_eq!(result.regions["Rize"], RegionRisk::NoData);

        assert_eq!(coordinator.state(), RunState::Idle);
        let snapshot = coordinator.store().snapshot();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.regions[0].risk, Some(70.0));
        assert_eq!(snapshot.regions[1].risk, Some(0.0));
    }

    #[tokio::test]
    async fn test_overlapping_start_is_rejected() {
        let (source, gate) = ScriptedSource::new(script).gated();
        let (coordinator, mut rx, request) = setup(source, None);

        coordinator.start(request.clone()).unwrap();
        assert_eq!(coordinator.state(), RunState::Running);
        assert_eq!(
            coordinator.start(request.clone()),
            Err(StartError::AlreadyRunning)
        );

        gate.send(true).unwrap();
        let first = next(&mut rx).await;
        assert!(matches!(first.outcome, RunOutcome::Succeeded(_)));
        assert_eq!(coordinator.state(), RunState::Idle);

        let second = coordinator.start(request).unwrap();
        assert_eq!(next(&mut rx).await.run_id, second);
    }

    #[tokio::test]
    async fn test_empty_nationwide_catalog_fails_run() {
        let (coordinator, mut rx, request) = setup(ScriptedSource::new(|_| Ok(vec![])), None);

        coordinator.start(request).unwrap();
        match next(&mut rx).await.outcome {
            RunOutcome::Failed(reason) => {
                assert!(reason.contains("no earthquake events found in the national catalog"));
            }
            RunOutcome::Succeeded(_) => panic!("expected failure"),
        }
        assert!(coordinator.store().current().is_none());
    }

    #[tokio::test]
    async fn test_nationwide_fetch_failure_fails_run() {
        let source = ScriptedSource::new(|_| {
            Err(FetchError::Decode {
                message: "not geojson".to_string(),
            })
        });
        let (coordinator, mut rx, request) = setup(source, None);

        coordinator.start(request).unwrap();
        match next(&mut rx).await.outcome {
            RunOutcome::Failed(reason) => assert!(reason.contains("nationwide event fetch failed")),
            RunOutcome::Succeeded(_) => panic!("expected failure"),
        }
        assert_eq!(coordinator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_discards_in_flight_run() {
        let (source, gate) = ScriptedSource::new(script).gated();
        let (coordinator, mut rx, request) = setup(source, None);

        coordinator.start(request.clone()).unwrap();
        coordinator.shutdown();
        gate.send(true).ok();

        let received = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(received.is_err());
        assert!(coordinator.store().current().is_none());
        assert_eq!(coordinator.start(request), Err(StartError::ShutDown));
    }

    async fn wait_idle(coordinator: &AnalysisCoordinator) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.state() == RunState::Running {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("run finished within 5s");
    }

    #[tokio::test]
    async fn test_shutdown_while_notification_pending_publishes_nothing() {
        let (coordinator, mut rx, request) = setup(ScriptedSource::new(script), None);

        // Fill the notification channel without reading it
        for _ in 0..NOTIFICATION_CAPACITY {
            coordinator.start(request.clone()).unwrap();
            wait_idle(&coordinator).await;
        }

        // This run finishes but cannot notify until a slot frees up
        coordinator.start(request).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.state(), RunState::Running);
        coordinator.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let generation = coordinator.store().snapshot().generation;
        assert_eq!(generation, NOTIFICATION_CAPACITY as u64);

        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, NOTIFICATION_CAPACITY);
        assert_eq!(coordinator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_run_timeout_fails_run() {
        let (source, _gate) = ScriptedSource::new(script).gated();
        let (coordinator, mut rx, request) = setup(source, Some(Duration::from_millis(50)));

        coordinator.start(request).unwrap();
        match next(&mut rx).await.outcome {
            RunOutcome::Failed(reason) => assert!(reason.contains("did not finish")),
            RunOutcome::Succeeded(_) => panic!("expected timeout"),
        }
    }
}
