//! Dashboard Polling Module
//!
//! Periodically refreshes the operator aggregates: a paired dashboard
//! snapshot and alert list fetch on a fixed cadence. Refreshes in flight are
//! never cancelled; instead every refresh carries a sequence number and a
//! response is applied only if it is the newest issued so far, so a slow
//! response can never overwrite fresher data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::alerts::AlertClient;
use crate::api::{Alert, ApiGateway, DashboardSnapshot};

/// Observed refresh cadence of the operator dashboard.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Latest applied refresh.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub snapshot: Option<DashboardSnapshot>,
    pub alerts: Vec<Alert>,
    seq: u64,
}

impl DashboardState {
    /// Apply a refresh result if and only if it is newer than everything
    /// applied before it. Returns whether the result was taken.
    fn apply(&mut self, seq: u64, snapshot: DashboardSnapshot, alerts: Vec<Alert>) -> bool {
        if seq <= self.seq {
            debug!("Discarding stale refresh {} (applied: {})", seq, self.seq);
            return false;
        }
        self.seq = seq;
        self.snapshot = Some(snapshot);
        self.alerts = alerts;
        true
    }

    /// Sequence number of the applied refresh; 0 before the first one.
    pub fn applied_seq(&self) -> u64 {
        self.seq
    }
}

/// Cancel handle for a running poller. Dropping it also stops the loop.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
        info!("Dashboard polling cancelled");
    }
}

/// Periodic refresher for the operator dashboard.
pub struct DashboardPoller {
    api: Arc<ApiGateway>,
    alerts: Arc<AlertClient>,
    state: Arc<Mutex<DashboardState>>,
    issued: Arc<AtomicU64>,
}

impl DashboardPoller {
    pub(crate) fn new(api: Arc<ApiGateway>, alerts: Arc<AlertClient>) -> Self {
        Self {
            api,
            alerts,
            state: Arc::new(Mutex::new(DashboardState::default())),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.state.lock().unwrap().clone()
    }

    /// Begin refreshing every `every`; the first refresh is issued
    /// immediately. Ticks overlap an in-flight refresh rather than cancel
    /// it; stale results are dropped on arrival.
    pub fn start(&self, every: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let api = self.api.clone();
        let alerts = self.alerts.clone();
        let state = self.state.clone();
        let issued = self.issued.clone();

        info!("Dashboard polling every {:?}", every);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let seq = issued.fetch_add(1, Ordering::SeqCst) + 1;
                        spawn_refresh(seq, api.clone(), alerts.clone(), state.clone());
                    }
                }
            }
            debug!("Dashboard polling loop ended");
        });

        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// One paired refresh. Failures leave the applied state untouched; the
/// gateway has already surfaced them.
fn spawn_refresh(
    seq: u64,
    api: Arc<ApiGateway>,
    alerts: Arc<AlertClient>,
    state: Arc<Mutex<DashboardState>>,
) {
    tokio::spawn(async move {
        let (snapshot, alert_list) = tokio::join!(
            api.get::<DashboardSnapshot>("/authority/dashboard"),
            alerts.list_alerts(),
        );

        match (snapshot, alert_list) {
            (Ok(snapshot), Ok(alert_list)) => {
                state.lock().unwrap().apply(seq, snapshot, alert_list);
            }
            _ => debug!("Dashboard refresh {} failed", seq),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AlertStatus, AlertType};
    use crate::testutil::{harness, Harness};
    use chrono::Utc;
    use reqwest::Method;

    fn snapshot(tourists: u64) -> DashboardSnapshot {
        DashboardSnapshot {
            tourists,
            active_alerts: 1,
            high_risk_zones: vec![],
            tourist_locations: vec![],
            recent_alerts: vec![],
        }
    }

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.into(),
            tourist_id: "u-1001".into(),
            alert_type: AlertType::Panic,
            message: "PANIC BUTTON pressed".into(),
            location: None,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn stale_refresh_is_dropped() {
        let mut state = DashboardState::default();

        assert!(state.apply(2, snapshot(20), vec![alert("a-2")]));

        // Refresh 1 was issued earlier but arrives later.
        assert!(!state.apply(1, snapshot(10), vec![alert("a-1")]));

        assert_eq!(state.applied_seq(), 2);
        assert_eq!(state.snapshot.as_ref().unwrap().tourists, 20);
        assert_eq!(state.alerts[0].id, "a-2");
    }

    #[test]
    fn equal_sequence_is_not_reapplied() {
        let mut state = DashboardState::default();
        assert!(state.apply(1, snapshot(10), vec![]));
        assert!(!state.apply(1, snapshot(99), vec![]));
        assert_eq!(state.snapshot.as_ref().unwrap().tourists, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_first_refresh_cannot_overwrite_a_newer_one() {
        let Harness { app, backend, .. } = harness();

        // Refresh 1: response delayed beyond the next tick. Refresh 2:
        // immediate. Last-writer-by-issue-order must hold.
        backend.script_delayed(
            Method::GET,
            "/authority/dashboard",
            200,
            serde_json::to_value(snapshot(10)).unwrap(),
            Duration::from_secs(40),
        );
        backend.script(Method::GET, "/authority/alerts", 200, serde_json::json!([alert("a-1")]));
        backend.script(
            Method::GET,
            "/authority/dashboard",
            200,
            serde_json::to_value(snapshot(20)).unwrap(),
        );
        backend.script(Method::GET, "/authority/alerts", 200, serde_json::json!([alert("a-2")]));

        let handle = app.dashboard.start(DEFAULT_POLL_INTERVAL);

        // Let both refreshes resolve: tick 2 fires at t+30s, the delayed
        // response from refresh 1 lands at t+40s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.cancel();

        let state = app.dashboard.state();
        assert_eq!(state.snapshot.as_ref().unwrap().tourists, 20);
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.alerts[0].id, "a-2");
        assert_eq!(state.applied_seq(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_refresh_fires_immediately_and_cancel_stops_the_loop() {
        let Harness { app, backend, .. } = harness();

        backend.script(
            Method::GET,
            "/authority/dashboard",
            200,
            serde_json::to_value(snapshot(5)).unwrap(),
        );
        backend.script(Method::GET, "/authority/alerts", 200, serde_json::json!([]));

        let handle = app.dashboard.start(DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = app.dashboard.state();
        assert_eq!(state.applied_seq(), 1);
        assert_eq!(state.snapshot.as_ref().unwrap().tourists, 5);

        handle.cancel();
        let calls_after_cancel = backend.calls().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(backend.calls().len(), calls_after_cancel, "no refreshes after cancel");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_leaves_applied_state_untouched() {
        let Harness { app, backend, .. } = harness();

        backend.script(
            Method::GET,
            "/authority/dashboard",
            200,
            serde_json::to_value(snapshot(5)).unwrap(),
        );
        backend.script(Method::GET, "/authority/alerts", 200, serde_json::json!([alert("a-1")]));
        // Second refresh fails on the snapshot leg.
        backend.script(
            Method::GET,
            "/authority/dashboard",
            503,
            serde_json::json!({"detail": "maintenance"}),
        );
        backend.script(Method::GET, "/authority/alerts", 200, serde_json::json!([]));

        let handle = app.dashboard.start(DEFAULT_POLL_INTERVAL);
        tokio::time::sleep(Duration::from_secs(45)).await;
        handle.cancel();

        let state = app.dashboard.state();
        assert_eq!(state.applied_seq(), 1);
        assert_eq!(state.snapshot.as_ref().unwrap().tourists, 5);
        assert_eq!(state.alerts[0].id, "a-1");
    }
}
