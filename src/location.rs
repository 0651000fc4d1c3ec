//! Location Tracking Module
//!
//! Wraps the device positioning capability: one-shot acquisition followed by
//! a continuous subscription. Keeps exactly one current coordinate for the
//! tracked identity and reports each fix to the backend fire-and-forget.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiGateway, LocationReport};
use crate::notify::{NoticeKind, Notifier};
use crate::session::SessionSignal;

/// A single device position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Acquisition parameters handed to the positioning capability. The tracker
/// passes them through; it does not enforce them itself.
#[derive(Debug, Clone)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub max_age: Duration,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_age: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Positioning errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PositionError {
    #[error("position access denied")]
    Denied,

    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position acquisition timed out")]
    Timeout,
}

#[derive(Debug)]
pub enum PositionEvent {
    Fix(Coordinate),
    Error(PositionError),
}

/// A live position subscription: a typed event stream plus its cancel
/// handle. Dropping the subscription also cancels it.
pub struct PositionSubscription {
    events: mpsc::Receiver<PositionEvent>,
}

impl PositionSubscription {
    pub fn new(events: mpsc::Receiver<PositionEvent>) -> Self {
        Self { events }
    }

    pub async fn next(&mut self) -> Option<PositionEvent> {
        self.events.recv().await
    }

    pub fn cancel(mut self) {
        self.events.close();
    }
}

/// The device positioning capability.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// One-shot position request.
    async fn acquire(&self, options: &PositionOptions) -> Result<Coordinate, PositionError>;

    /// Continuous position updates until the subscription is cancelled.
    fn subscribe(&self, options: &PositionOptions) -> PositionSubscription;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Offline,
    Searching,
    Online,
}

/// Shared read view of the current coordinate. AlertClient and the map
/// surface consume this; only the tracker writes it.
#[derive(Clone)]
pub struct PositionHandle {
    current: Arc<Mutex<Option<Coordinate>>>,
}

impl PositionHandle {
    pub fn current(&self) -> Option<Coordinate> {
        *self.current.lock().unwrap()
    }
}

/// Tracks the device position for the authenticated tourist.
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    api: Arc<ApiGateway>,
    session: SessionSignal,
    notifier: Arc<dyn Notifier>,
    options: PositionOptions,
    current: Arc<Mutex<Option<Coordinate>>>,
    state_tx: watch::Sender<TrackingState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocationTracker {
    pub(crate) fn new(
        source: Arc<dyn PositionSource>,
        api: Arc<ApiGateway>,
        session: SessionSignal,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state_tx, _) = watch::channel(TrackingState::Offline);
        Self {
            source,
            api,
            session,
            notifier,
            options: PositionOptions::default(),
            current: Arc::new(Mutex::new(None)),
            state_tx,
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> TrackingState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> Option<Coordinate> {
        *self.current.lock().unwrap()
    }

    /// Read view for components that need the coordinate but not the tracker.
    pub fn position_handle(&self) -> PositionHandle {
        PositionHandle {
            current: self.current.clone(),
        }
    }

    /// Acquire an initial fix, then follow the continuous subscription.
    ///
    /// Every fix replaces the current coordinate and is reported upstream;
    /// a failed report is logged but never reverts tracking state.
    pub async fn start(&self) {
        self.state_tx.send_replace(TrackingState::Searching);

        match self.source.acquire(&self.options).await {
            Ok(fix) => {
                info!("Initial position acquired");
                *self.current.lock().unwrap() = Some(fix);
                report(&self.api, &self.session, fix);
                self.state_tx.send_replace(TrackingState::Online);
                self.spawn_watcher();
            }
            Err(e) => {
                warn!("Position acquisition failed: {}", e);
                self.state_tx.send_replace(TrackingState::Offline);
                self.notifier.notify(
                    NoticeKind::Error,
                    "Location access denied. Some features may be limited.",
                );
            }
        }
    }

    fn spawn_watcher(&self) {
        let mut subscription = self.source.subscribe(&self.options);
        let api = self.api.clone();
        let session = self.session.clone();
        let current = self.current.clone();
        let state_tx = self.state_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    PositionEvent::Fix(fix) => {
                        // Most recently delivered wins, regardless of the
                        // embedded timestamp.
                        *current.lock().unwrap() = Some(fix);
                        report(&api, &session, fix);
                    }
                    PositionEvent::Error(e) => {
                        warn!("Position subscription error: {}", e);
                        state_tx.send_replace(TrackingState::Offline);
                    }
                }
            }
            debug!("Position subscription ended");
        });

        if let Some(previous) = self.worker.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the continuous subscription. Required on view teardown; a
    /// leaked watcher is a defect.
    pub fn stop(&self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
            debug!("Location tracking stopped");
        }
        self.state_tx.send_replace(TrackingState::Offline);
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Fire-and-forget location report for the tracked identity.
fn report(api: &Arc<ApiGateway>, session: &SessionSignal, fix: Coordinate) {
    let api = api.clone();
    let session = session.clone();
    tokio::spawn(async move {
        let Some(identity) = session.identity() else {
            debug!("Skipping location report: no authenticated identity");
            return;
        };
        let body = LocationReport {
            tourist_id: identity.id,
            latitude: fix.latitude,
            longitude: fix.longitude,
        };
        if let Err(e) = api.put("/tourist/location", &body).await {
            debug!("Location report failed: {}", e);
        }
    });
}
