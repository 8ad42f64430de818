//! Shared application state

use super::error::ApiError;
use crate::config::{Config, StoreBackend};
use crate::hub::Hub;
use crate::recorder::Recorder;
use crate::store::{MemoryStore, PersistenceStore, RestStore, StoreError};
use std::sync::Arc;

/// State handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,

    /// `None` when the store is not configured
    recorder: Option<Recorder>,

    /// Settings that were missing at startup, for the error message
    missing: Vec<&'static str>,

    pub max_message_bytes: usize,
}

impl AppState {
    /// Wire up the store and the hub from configuration.
    ///
    /// A missing store URL or key is not fatal here: the relay runs without
    /// recording and store-backed endpoints answer with an error.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let missing = config.store.missing();

        let store: Option<Arc<dyn PersistenceStore>> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store; records are lost on exit");
                Some(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Rest => match (&config.store.url, &config.store.key) {
                (Some(url), Some(key)) if missing.is_empty() => Some(Arc::new(RestStore::new(
                    url,
                    key.clone(),
                    config.store.request_timeout(),
                )?)),
                _ => {
                    tracing::warn!(
                        missing = %missing.join(", "),
                        "Store not configured; relay runs without recording"
                    );
                    None
                }
            },
        };

        let recorder = store.map(Recorder::new);
        let mut hub = Hub::new(config.hub.send_policy());
        if let Some(recorder) = &recorder {
            hub = hub.with_recorder(recorder.clone());
        }

        Ok(Self {
            hub: Arc::new(hub),
            recorder,
            missing,
            max_message_bytes: config.hub.max_message_bytes,
        })
    }

    /// State around an existing hub and recorder
    pub fn new(hub: Arc<Hub>, recorder: Option<Recorder>, max_message_bytes: usize) -> Self {
        Self {
            hub,
            recorder,
            missing: Vec::new(),
            max_message_bytes,
        }
    }

    pub fn store_configured(&self) -> bool {
        self.recorder.is_some()
    }

    /// The recorder, or `StoreMisconfigured` for store-backed endpoints
    pub fn recorder(&self) -> Result<&Recorder, ApiError> {
        self.recorder.as_ref().ok_or_else(|| {
            let detail = if self.missing.is_empty() {
                "store url and key are not set".to_string()
            } else {
                format!("missing {}", self.missing.join(", "))
            };
            StoreError::Misconfigured(detail).into()
        })
    }
}
