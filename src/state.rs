use std::sync::Arc;

use crate::config::EngineSettings;
use crate::engine::MatchingEngine;
use crate::store::{InMemoryStore, MatchingStore};

pub struct AppState {
    pub engine: Arc<MatchingEngine>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MatchingStore>,
        settings: EngineSettings,
        event_buffer_size: usize,
    ) -> Self {
        Self {
            engine: Arc::new(MatchingEngine::new(store, settings, event_buffer_size)),
        }
    }

    pub fn in_memory(settings: EngineSettings, event_buffer_size: usize) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), settings, event_buffer_size)
    }
}
