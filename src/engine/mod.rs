//! The matching and assignment engine.
//!
//! [`MatchingEngine`] is an explicitly constructed service: callers share it
//! through an `Arc` instead of reaching for a process-wide instance. Its
//! operations are split across the submodules by concern.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::models::assignment::MatchingAssignment;
use crate::models::config::MatchingAlgorithmConfig;
use crate::observability::metrics::Metrics;
use crate::store::{MatchingStore, StoreError};

pub mod assignment;
pub mod expiry;
pub mod lifecycle;
pub mod locator;
pub mod matcher;
pub mod performance;
pub mod queue;
pub mod response;
pub mod scoring;
pub mod statistics;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferEventKind {
    Offered,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

/// Published for every offer created or resolved. Driver notification is the
/// subscriber's job.
#[derive(Debug, Clone, Serialize)]
pub struct OfferEvent {
    pub kind: OfferEventKind,
    pub assignment: MatchingAssignment,
}

pub struct MatchingEngine {
    store: Arc<dyn MatchingStore>,
    settings: EngineSettings,
    config: RwLock<Option<Arc<MatchingAlgorithmConfig>>>,
    events_tx: broadcast::Sender<OfferEvent>,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<dyn MatchingStore>,
        settings: EngineSettings,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            store,
            settings,
            config: RwLock::new(None),
            events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MatchingStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfferEvent> {
        self.events_tx.subscribe()
    }

    /// The cached config, loading it on first use.
    pub async fn current_config(&self) -> Arc<MatchingAlgorithmConfig> {
        if let Some(config) = self.config.read().await.as_ref() {
            return config.clone();
        }
        self.refresh_config().await
    }

    /// Reloads the active config from the store. When none exists the default
    /// is persisted and activated. When the store cannot be reached the last
    /// loaded config is kept, or the default is used without caching it.
    pub async fn refresh_config(&self) -> Arc<MatchingAlgorithmConfig> {
        let loaded = match self.bounded(self.store.active_config()).await {
            Ok(Some(config)) => Some(config),
            Ok(None) => {
                let default = MatchingAlgorithmConfig::default();
                match self.bounded(self.store.activate_config(default.clone())).await {
                    Ok(()) => {
                        info!(version = default.version, "activated default matching config");
                        Some(default)
                    }
                    Err(err) => {
                        error!(error = %err, "failed to persist default matching config");
                        None
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "failed to load matching config");
                None
            }
        };

        let mut cached = self.config.write().await;
        match loaded {
            Some(config) => {
                let config = Arc::new(config);
                *cached = Some(config.clone());
                config
            }
            None => match cached.as_ref() {
                Some(previous) => {
                    warn!(version = previous.version, "keeping previously loaded matching config");
                    previous.clone()
                }
                None => Arc::new(MatchingAlgorithmConfig::default()),
            },
        }
    }

    /// Runs a store call under the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.settings.store_timeout, call)
            .await
            .map_err(|_| StoreError::Backend("store call timed out".to_string()))?
    }

    fn publish(&self, kind: OfferEventKind, assignment: &MatchingAssignment) {
        let _ = self.events_tx.send(OfferEvent {
            kind,
            assignment: assignment.clone(),
        });
    }

    async fn refresh_queue_depth(&self) {
        match self.store.pending_reassignments().await {
            Ok(depth) => self.metrics.reassignment_queue_depth.set(depth as i64),
            Err(err) => warn!(error = %err, "failed to read reassignment queue depth"),
        }
    }
}
