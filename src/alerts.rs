//! Alert Client Module
//!
//! Raises panic alerts for the tracked identity and gives operators the
//! read/resolve path over server-owned alerts. Alert records live on the
//! server; the list held here is only the most recent fetch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::api::{Alert, AlertStatus, AlertType, ApiError, ApiGateway, PanicReceipt, Zone};
use crate::location::PositionHandle;
use crate::notify::{NoticeKind, Notifier};

/// Delay before the follow-up reassurance notice after a panic alert.
const REASSURANCE_DELAY: Duration = Duration::from_secs(2);

/// Alert errors
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("no current location")]
    NoLocation,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Display emphasis derived from the alert type. Never feeds a business
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn of(alert_type: AlertType) -> Self {
        match alert_type {
            AlertType::Panic => AlertPriority::Critical,
            AlertType::Missing => AlertPriority::High,
            AlertType::GeoFence => AlertPriority::Medium,
            AlertType::Anomaly => AlertPriority::Low,
        }
    }
}

/// View predicate over a fetched alert list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFilter {
    All,
    Active,
    Resolved,
    OfType(AlertType),
}

impl AlertFilter {
    fn matches(&self, alert: &Alert) -> bool {
        match self {
            AlertFilter::All => true,
            AlertFilter::Active => alert.status == AlertStatus::Active,
            AlertFilter::Resolved => alert.status == AlertStatus::Resolved,
            AlertFilter::OfType(t) => alert.alert_type == *t,
        }
    }
}

/// Derived view over an alert list; preserves relative order, never
/// persisted.
pub fn filter(alerts: &[Alert], predicate: AlertFilter) -> Vec<Alert> {
    alerts
        .iter()
        .filter(|a| predicate.matches(a))
        .cloned()
        .collect()
}

/// Client for the alert read/write surface.
pub struct AlertClient {
    api: Arc<ApiGateway>,
    position: PositionHandle,
    notifier: Arc<dyn Notifier>,
    latest: Mutex<Vec<Alert>>,
}

impl AlertClient {
    pub(crate) fn new(
        api: Arc<ApiGateway>,
        position: PositionHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            position,
            notifier,
            latest: Mutex::new(Vec::new()),
        }
    }

    /// Raise a panic alert for the tracked identity.
    ///
    /// Requires a current coordinate; the server resolves identity and last
    /// location server-side, so the precondition is checked before any
    /// network traffic.
    pub async fn raise_panic(&self) -> Result<PanicReceipt, AlertError> {
        if self.position.current().is_none() {
            self.notifier.notify(
                NoticeKind::Error,
                "Location not available. Please enable location services.",
            );
            return Err(AlertError::NoLocation);
        }

        let receipt: PanicReceipt = self.api.post_empty("/tourist/panic").await?;
        info!("Panic alert raised: {}", receipt.alert_id);

        self.notifier.notify(
            NoticeKind::Success,
            "🚨 PANIC ALERT SENT! Authorities have been notified.",
        );

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REASSURANCE_DELAY).await;
            notifier.notify(
                NoticeKind::Success,
                "Emergency services are on their way. Stay calm and stay visible.",
            );
        });

        Ok(receipt)
    }

    /// Fetch the alert list; replaces the local copy wholesale.
    pub async fn list_alerts(&self) -> Result<Vec<Alert>, AlertError> {
        let alerts: Vec<Alert> = self.api.get("/authority/alerts").await?;
        debug!("Fetched {} alerts", alerts.len());
        *self.latest.lock().unwrap() = alerts.clone();
        Ok(alerts)
    }

    /// The most recently fetched list. Never authoritative.
    pub fn latest(&self) -> Vec<Alert> {
        self.latest.lock().unwrap().clone()
    }

    /// Request the one-way `active → resolved` transition, then re-fetch to
    /// converge. On failure the local list is left untouched.
    pub async fn resolve(&self, alert_id: &str) -> Result<(), AlertError> {
        self.api
            .put_empty(&format!("/authority/alerts/{}/resolve", alert_id))
            .await?;

        self.notifier
            .notify(NoticeKind::Success, "Alert resolved successfully");
        self.list_alerts().await?;
        Ok(())
    }

    /// Risk-zone reference data for the map surface.
    pub async fn zones(&self) -> Result<Vec<Zone>, AlertError> {
        Ok(self.api.get("/zones").await?)
    }
}
