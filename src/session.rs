//! Auth Session Module
//!
//! Owns the authenticated identity and its credential for the lifetime of
//! the process. Every other component reaches identity state through this
//! module; nothing else may mutate it.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{ApiError, ApiGateway, LoginRequest, RegisterRequest, TokenResponse, TouristProfile};
use crate::notify::{NoticeKind, Notifier};
use crate::store::SessionStore;

pub const MIN_PASSWORD_LEN: usize = 6;

/// The authenticated user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tourist,
    Authority,
}

/// Opaque bearer token paired 1:1 with an [`Identity`]. A credential without
/// a live identity is meaningless; the two are stored and cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Auth errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Shared identity/credential slot plus the observable session state.
///
/// Mutation goes through [`AuthSession`]; the gateway holds a
/// [`SessionSignal`] that can only read the token or force expiry.
pub(crate) struct SessionCore {
    slot: Mutex<Option<(Identity, Credential)>>,
    state_tx: watch::Sender<SessionState>,
    store: Arc<dyn SessionStore>,
}

impl SessionCore {
    pub(crate) fn new(store: Arc<dyn SessionStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            slot: Mutex::new(None),
            state_tx,
            store,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn token(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, credential)| credential.as_str().to_string())
    }

    fn identity(&self) -> Option<Identity> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|(identity, _)| identity.clone())
    }

    /// Commit a fresh identity/credential pair: persist first, then publish.
    fn commit(&self, identity: Identity, credential: Credential) {
        if let Err(e) = self.store.save(&identity, &credential) {
            error!("Failed to persist session: {}", e);
        }
        *self.slot.lock().unwrap() = Some((identity, credential));
        self.set_state(SessionState::Authenticated);
    }

    /// Drop the pair everywhere at once: store, memory, observable state.
    fn clear(&self) {
        self.store.clear();
        *self.slot.lock().unwrap() = None;
        self.set_state(SessionState::Anonymous);
    }
}

/// Read-and-expire view of the session handed to the gateway. The gateway
/// never mutates identity state directly; `expire` routes the teardown back
/// through the session core.
#[derive(Clone)]
pub struct SessionSignal {
    core: Arc<SessionCore>,
}

impl SessionSignal {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub(crate) fn bearer(&self) -> Option<String> {
        self.core.token()
    }

    pub(crate) fn identity(&self) -> Option<Identity> {
        self.core.identity()
    }

    /// Forced teardown on an Unauthorized classification. In-flight calls
    /// that fail after this point are not retried.
    pub(crate) fn expire(&self) {
        if self.core.state() != SessionState::Anonymous {
            info!("Session expired; clearing credentials");
        }
        self.core.clear();
    }
}

/// Everything a registration form carries. The confirmation and the
/// role-specific requirements are validated locally before any network call.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub id_proof_number: Option<String>,
}

impl RegistrationForm {
    fn validate(&self) -> Result<(), AuthError> {
        if self.password != self.confirm_password {
            return Err(AuthError::Validation("Passwords do not match".into()));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(
                "Password must be at least 6 characters long".into(),
            ));
        }
        if self.role == Role::Tourist
            && self
                .id_proof_number
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(AuthError::Validation(
                "ID proof number is required for tourist registration".into(),
            ));
        }
        Ok(())
    }
}

/// Owns login, registration, logout, and startup restore.
pub struct AuthSession {
    core: Arc<SessionCore>,
    api: Arc<ApiGateway>,
    notifier: Arc<dyn Notifier>,
}

impl AuthSession {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        api: Arc<ApiGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { core, api, notifier }
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Observe session state transitions, including forced teardown. A shell
    /// watches this to navigate back to the unauthenticated entry point.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.state_tx.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.core.identity()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.core.set_state(SessionState::Authenticating);

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let result: Result<TokenResponse, ApiError> =
            self.api.post("/auth/login", &request).await;
        match result {
            Ok(token) => {
                let identity = token.user.clone();
                info!("Login succeeded for user: {}", identity.id);
                self.core
                    .commit(token.user, Credential::new(token.access_token));
                self.notifier.notify(
                    NoticeKind::Success,
                    &format!("Welcome back, {}!", identity.full_name),
                );
                Ok(identity)
            }
            Err(e) => {
                // A 401 already cleared state through the gateway; every
                // other failure leaves us anonymous as well.
                if self.core.state() == SessionState::Authenticating {
                    self.core.set_state(SessionState::Anonymous);
                }
                Err(e.into())
            }
        }
    }

    pub async fn register(&self, form: RegistrationForm) -> Result<Identity, AuthError> {
        if let Err(e) = form.validate() {
            self.notifier.notify(NoticeKind::Error, &e.to_string());
            return Err(e);
        }

        self.core.set_state(SessionState::Authenticating);

        let request = RegisterRequest {
            email: form.email,
            password: form.password,
            full_name: form.full_name,
            role: form.role,
            phone: form.phone,
            emergency_contact: form.emergency_contact,
            emergency_phone: form.emergency_phone,
            id_proof_number: form.id_proof_number,
        };

        let result: Result<TokenResponse, ApiError> =
            self.api.post("/auth/register", &request).await;
        match result {
            Ok(token) => {
                let identity = token.user.clone();
                info!("Registration succeeded for user: {}", identity.id);
                self.core
                    .commit(token.user, Credential::new(token.access_token));
                self.notifier.notify(
                    NoticeKind::Success,
                    &format!("Registration successful! Welcome {}", identity.full_name),
                );
                Ok(identity)
            }
            Err(e) => {
                if self.core.state() == SessionState::Authenticating {
                    self.core.set_state(SessionState::Anonymous);
                }
                Err(e.into())
            }
        }
    }

    /// Local-only: always succeeds from the caller's perspective.
    pub fn logout(&self) {
        info!("Logging out");
        self.core.clear();
        self.notifier
            .notify(NoticeKind::Success, "Logged out successfully.");
    }

    /// One-shot startup restore. The credential is accepted optimistically;
    /// a stale token surfaces as Unauthorized on the first authenticated
    /// call, which tears the session back down.
    pub fn restore(&self) -> Option<Identity> {
        match self.core.store.load() {
            Some((identity, credential)) => {
                info!("Restored session for user: {}", identity.id);
                *self.core.slot.lock().unwrap() = Some((identity.clone(), credential));
                self.core.set_state(SessionState::Authenticated);
                Some(identity)
            }
            None => {
                warn!("No session to restore");
                None
            }
        }
    }

    /// Tourist profile, read on dashboard entry.
    pub async fn fetch_profile(&self) -> Result<TouristProfile, ApiError> {
        self.api.get("/tourist/profile").await
    }
}
