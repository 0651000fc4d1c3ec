//! Test Support
//!
//! Scripted in-memory stand-ins for the seams this crate depends on: the
//! HTTP transport, the positioning capability, and the notification surface.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::mpsc;

use crate::api::{BackendError, HttpBackend, RawRequest, RawResponse};
use crate::location::{
    PositionError, PositionEvent, PositionOptions, PositionSource, PositionSubscription,
};
use crate::notify::{Notifier, NoticeKind};
use crate::session::{Identity, Role};
use crate::store::MemoryStore;
use crate::AppState;

enum Scripted {
    Respond {
        status: u16,
        body: serde_json::Value,
        delay: Option<Duration>,
    },
    TransportFailure(String),
}

/// Scripted HTTP transport. Responses are queued per `(method, path)` and
/// consumed in order; every request is recorded for assertions.
#[derive(Default)]
pub(crate) struct MockBackend {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RawRequest>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.push(method, path, Scripted::Respond { status, body, delay: None });
    }

    pub(crate) fn script_delayed(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: serde_json::Value,
        delay: Duration,
    ) {
        self.push(method, path, Scripted::Respond { status, body, delay: Some(delay) });
    }

    pub(crate) fn script_transport_failure(&self, method: Method, path: &str, reason: &str) {
        self.push(method, path, Scripted::TransportFailure(reason.to_string()));
    }

    pub(crate) fn script_login_success(&self, user: &Identity) {
        self.script(
            Method::POST,
            "/auth/login",
            200,
            serde_json::json!({
                "access_token": "tok-demo",
                "token_type": "bearer",
                "user": user,
            }),
        );
    }

    pub(crate) fn script_register_success(&self, user: &Identity) {
        self.script(
            Method::POST,
            "/auth/register",
            200,
            serde_json::json!({
                "access_token": "tok-demo",
                "token_type": "bearer",
                "user": user,
            }),
        );
    }

    pub(crate) fn demo_tourist(&self) -> Identity {
        Identity {
            id: "u-1001".into(),
            email: "tourist@demo.com".into(),
            full_name: "Demo Tourist".into(),
            role: Role::Tourist,
        }
    }

    pub(crate) fn calls(&self) -> Vec<RawRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, method: Method, path: &str, outcome: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(outcome);
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn execute(&self, request: RawRequest) -> Result<RawResponse, BackendError> {
        self.calls.lock().unwrap().push(request.clone());

        let scripted = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&(request.method.clone(), request.path.clone()))
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(Scripted::Respond { status, body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(RawResponse {
                    status,
                    body: serde_json::to_vec(&body).unwrap(),
                })
            }
            Some(Scripted::TransportFailure(reason)) => Err(BackendError(reason)),
            None => Ok(RawResponse {
                status: 404,
                body: serde_json::to_vec(&serde_json::json!({
                    "detail": format!("no scripted response for {} {}", request.method, request.path),
                }))
                .unwrap(),
            }),
        }
    }
}

/// Scripted positioning capability. The one-shot result is set up front;
/// continuous events are fed through `feed` after `subscribe` ran.
pub(crate) struct MockPositionSource {
    acquire_result: Mutex<Result<crate::location::Coordinate, PositionError>>,
    feed_tx: Mutex<Option<mpsc::Sender<PositionEvent>>>,
}

impl MockPositionSource {
    pub(crate) fn new() -> Self {
        Self {
            acquire_result: Mutex::new(Err(PositionError::Unavailable("not scripted".into()))),
            feed_tx: Mutex::new(None),
        }
    }

    pub(crate) fn set_acquire(&self, result: Result<crate::location::Coordinate, PositionError>) {
        *self.acquire_result.lock().unwrap() = result;
    }

    /// Deliver a subscription event; ignored if nothing is subscribed.
    pub(crate) async fn feed(&self, event: PositionEvent) {
        let tx = self.feed_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl PositionSource for MockPositionSource {
    async fn acquire(
        &self,
        _options: &PositionOptions,
    ) -> Result<crate::location::Coordinate, PositionError> {
        self.acquire_result.lock().unwrap().clone()
    }

    fn subscribe(&self, _options: &PositionOptions) -> PositionSubscription {
        let (tx, rx) = mpsc::channel(16);
        *self.feed_tx.lock().unwrap() = Some(tx);
        PositionSubscription::new(rx)
    }
}

/// Records every notice for assertions.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.notices().into_iter().map(|(_, m)| m).collect()
    }

    pub(crate) fn clear(&self) {
        self.notices.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.notices.lock().unwrap().push((kind, message.to_string()));
    }
}

/// A fully wired [`AppState`] over scripted collaborators.
pub(crate) struct Harness {
    pub(crate) app: AppState,
    pub(crate) backend: Arc<MockBackend>,
    pub(crate) source: Arc<MockPositionSource>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) store: Arc<MemoryStore>,
}

pub(crate) fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()))
}

pub(crate) fn harness_with_store(store: Arc<MemoryStore>) -> Harness {
    let backend = Arc::new(MockBackend::new());
    let source = Arc::new(MockPositionSource::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let app = AppState::with_backend(
        backend.clone(),
        store.clone(),
        source.clone(),
        notifier.clone(),
    );

    Harness {
        app,
        backend,
        source,
        notifier,
        store,
    }
}

/// Let spawned fire-and-forget tasks run to completion on the test runtime.
pub(crate) async fn drain_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
