//! API Gateway Module
//!
//! Single point of outbound HTTP to the SafeTour backend. Attaches the
//! bearer token when a credential exists, classifies every failure into the
//! client error taxonomy, and surfaces each failure exactly once through the
//! notification surface before re-raising it to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::location::Coordinate;
use crate::notify::{NoticeKind, Notifier};
use crate::session::{Identity, Role, SessionSignal};

/// A request as handed to the transport layer.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// A response as received from the transport layer.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failure: no usable response was received.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// The wire transport behind the gateway. Production uses [`ReqwestBackend`];
/// tests substitute a scripted mock.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, BackendError>;
}

/// Production transport over reqwest. Prefixes every path with `/api`.
pub struct ReqwestBackend {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, BackendError> {
        let url = format!("{}/api{}", self.base_url, request.path);

        let mut builder = self.client.request(request.method, &url);
        if let Some(token) = &request.bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError(e.to_string()))?
            .to_vec();

        Ok(RawResponse { status, body })
    }
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Structured error payload the backend attaches to failures.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Gateway for all outbound calls.
pub struct ApiGateway {
    backend: Arc<dyn HttpBackend>,
    session: SessionSignal,
    notifier: Arc<dyn Notifier>,
}

impl ApiGateway {
    pub(crate) fn new(
        backend: Arc<dyn HttpBackend>,
        session: SessionSignal,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            session,
            notifier,
        }
    }

    /// Issue a request and classify the outcome. The returned bytes are the
    /// raw success body; failures have already been surfaced once.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let request = RawRequest {
            method,
            path: path.to_string(),
            bearer: self.session.bearer(),
            body,
        };

        debug!("{} {}", request.method, request.path);

        match self.backend.execute(request).await {
            Ok(response) => self.classify(path, response),
            Err(e) => {
                warn!("Transport failure on {}: {}", path, e);
                self.notifier.notify(
                    NoticeKind::Error,
                    "Network error. Please check your connection.",
                );
                Err(ApiError::Network(e.0))
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let bytes = self.request(Method::GET, path, None).await?;
        Self::decode(&bytes)
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        let bytes = self.request(Method::POST, path, Some(body)).await?;
        Self::decode(&bytes)
    }

    /// POST with no request body; the server derives everything from the
    /// authenticated identity.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let bytes = self.request(Method::POST, path, None).await?;
        Self::decode(&bytes)
    }

    /// PUT whose response body is irrelevant to the caller.
    pub async fn put(&self, path: &str, body: &impl Serialize) -> Result<(), ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.request(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    /// PUT with neither request nor interesting response body.
    pub async fn put_empty(&self, path: &str) -> Result<(), ApiError> {
        self.request(Method::PUT, path, None).await?;
        Ok(())
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
        serde_json::from_slice(bytes).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Map a received response onto the error taxonomy, surfacing the failure
    /// through the notification surface exactly once.
    fn classify(&self, path: &str, response: RawResponse) -> Result<Vec<u8>, ApiError> {
        let status = response.status;
        if (200..300).contains(&status) {
            return Ok(response.body);
        }

        let detail = serde_json::from_slice::<ErrorBody>(&response.body)
            .ok()
            .map(|b| b.detail);

        match status {
            401 => {
                info!("Received 401 on {}; tearing down session", path);
                self.session.expire();
                self.notifier
                    .notify(NoticeKind::Error, "Session expired. Please login again.");
                Err(ApiError::Unauthorized)
            }
            403 => {
                self.notifier
                    .notify(NoticeKind::Error, "Access denied. Insufficient permissions.");
                Err(ApiError::Forbidden(
                    detail.unwrap_or_else(|| "Access denied".to_string()),
                ))
            }
            s if s >= 500 => {
                warn!("Server error {} on {}", s, path);
                self.notifier
                    .notify(NoticeKind::Error, "Server error. Please try again later.");
                Err(ApiError::Server(
                    detail.unwrap_or_else(|| format!("status {}", s)),
                ))
            }
            s => {
                let message = detail
                    .unwrap_or_else(|| "An unexpected error occurred.".to_string());
                debug!("Request to {} rejected with {}: {}", path, s, message);
                self.notifier.notify(NoticeKind::Error, &message);
                Err(ApiError::Rejected(message))
            }
        }
    }
}

// Wire types

/// Successful login/registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: Identity,
}

/// Registration payload sent to the backend. The confirmation field never
/// leaves the client.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub id_proof_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Location report for the tracked identity.
#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    pub tourist_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Receipt for a raised panic alert.
#[derive(Debug, Clone, Deserialize)]
pub struct PanicReceipt {
    pub message: String,
    pub alert_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Panic,
    GeoFence,
    Anomaly,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// A server-owned safety event. The client is a read/write proxy: the list
/// held locally is never authoritative beyond the most recent fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub tourist_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub location: Option<Coordinate>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Geofenced reference area with an associated risk level. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius: f64,
    pub risk_level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

/// Tourist-facing profile, read on dashboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouristProfile {
    pub digital_id: String,
    pub safety_score: u8,
    pub blockchain_hash: String,
    #[serde(default)]
    pub trip_end_date: Option<DateTime<Utc>>,
    pub family_tracking_enabled: bool,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
}

impl TouristProfile {
    /// Family tracking is a local preference: the backend exposes no update
    /// contract for it, so the flag is flipped client-side only.
    pub fn set_family_tracking(&mut self, enabled: bool, notifier: &dyn Notifier) {
        self.family_tracking_enabled = enabled;
        let state = if enabled { "enabled" } else { "disabled" };
        notifier.notify(NoticeKind::Success, &format!("Family tracking {}", state));
    }
}

/// One monitored tourist as it appears in the operator snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouristLocation {
    pub user_id: String,
    #[serde(default)]
    pub current_location: Option<Coordinate>,
}

/// Operator-facing aggregates returned by the dashboard endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub tourists: u64,
    pub active_alerts: u64,
    #[serde(default)]
    pub high_risk_zones: Vec<Zone>,
    #[serde(default)]
    pub tourist_locations: Vec<TouristLocation>,
    #[serde(default)]
    pub recent_alerts: Vec<Alert>,
}
