//! Session Storage Module
//!
//! Persists the authenticated identity and its bearer token across process
//! restarts. The two are written as a single record so they can never be
//! saved or removed independently.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::{Credential, Identity};

/// The persisted identity/token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    identity: Identity,
    token: Credential,
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Pluggable persistence for the session record.
///
/// `load` fails soft: corrupt or unreadable data behaves as absent and the
/// offending entry is cleared, so a bad write can never wedge startup.
pub trait SessionStore: Send + Sync {
    fn save(&self, identity: &Identity, credential: &Credential) -> Result<(), StoreError>;
    fn load(&self) -> Option<(Identity, Credential)>;
    fn clear(&self);
}

/// Durable store keeping the session record as a JSON file in the
/// platform-local data directory.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the default application data directory.
    pub fn new() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("SafeTour");
        Self::with_dir(dir)
    }

    /// Create a store rooted at an explicit directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create session storage directory: {}", e);
        }
        Self {
            path: dir.join("session.json"),
        }
    }
}

impl SessionStore for FileStore {
    fn save(&self, identity: &Identity, credential: &Credential) -> Result<(), StoreError> {
        let record = StoredSession {
            identity: identity.clone(),
            token: credential.clone(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        std::fs::write(&self.path, json).map_err(|e| StoreError::Io(e.to_string()))?;

        info!("Saved session for user: {}", identity.id);
        Ok(())
    }

    fn load(&self) -> Option<(Identity, Credential)> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored session found");
                return None;
            }
            Err(e) => {
                warn!("Failed to read stored session: {}", e);
                self.clear();
                return None;
            }
        };

        match serde_json::from_slice::<StoredSession>(&raw) {
            Ok(record) => Some((record.identity, record.token)),
            Err(e) => {
                warn!("Stored session is corrupt, clearing it: {}", e);
                self.clear();
                None
            }
        }
    }

    fn clear(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to clear stored session: {}", e);
            } else {
                info!("Cleared stored session");
            }
        }
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<(Identity, Credential)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, identity: &Identity, credential: &Credential) -> Result<(), StoreError> {
        *self.slot.lock().unwrap() = Some((identity.clone(), credential.clone()));
        Ok(())
    }

    fn load(&self) -> Option<(Identity, Credential)> {
        self.slot.lock().unwrap().clone()
    }

    fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }
}
