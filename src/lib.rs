//! SafeTour Safety Companion Client
//!
//! Client-side core of the SafeTour tourist-safety platform: session
//! authentication, continuous location tracking and reporting, panic
//! alerts, and the operator alert/dashboard read path. Presentation (maps,
//! toasts, navigation) stays outside; this crate talks to it through the
//! [`notify::Notifier`] trait and observable state channels.

pub mod alerts;
pub mod api;
pub mod dashboard;
pub mod location;
pub mod logging;
pub mod notify;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use alerts::AlertClient;
use api::{ApiGateway, HttpBackend, ReqwestBackend};
use dashboard::DashboardPoller;
use location::{LocationTracker, PositionSource};
use notify::Notifier;
use session::{AuthSession, SessionCore, SessionSignal};
use store::SessionStore;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("SAFETOUR_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Application state wired once at process start and passed by reference to
/// whatever shell drives it. Identity and credential live in the session;
/// every other component reaches them through injected handles, never
/// through globals.
pub struct AppState {
    pub session: AuthSession,
    pub api: Arc<ApiGateway>,
    pub tracker: LocationTracker,
    pub alerts: Arc<AlertClient>,
    pub dashboard: DashboardPoller,
}

impl AppState {
    /// Production wiring over the real HTTP transport.
    pub fn new(
        config: &ClientConfig,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn PositionSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let backend = Arc::new(ReqwestBackend::new(&config.api_base_url));
        Self::with_backend(backend, store, source, notifier)
    }

    /// Wiring over an explicit transport; tests substitute a scripted one.
    pub fn with_backend(
        backend: Arc<dyn HttpBackend>,
        store: Arc<dyn SessionStore>,
        source: Arc<dyn PositionSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let core = Arc::new(SessionCore::new(store));
        let signal = SessionSignal::new(core.clone());

        let api = Arc::new(ApiGateway::new(backend, signal.clone(), notifier.clone()));
        let session = AuthSession::new(core, api.clone(), notifier.clone());
        let tracker = LocationTracker::new(source, api.clone(), signal, notifier.clone());
        let alerts = Arc::new(AlertClient::new(
            api.clone(),
            tracker.position_handle(),
            notifier,
        ));
        let dashboard = DashboardPoller::new(api.clone(), alerts.clone());

        Self {
            session,
            api,
            tracker,
            alerts,
            dashboard,
        }
    }
}
