// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, trace};

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{Event, EventGroup};
use crate::core::store::{EventStore, Predicate};

/// Store front-end carrying the per-epoch query cache.
///
/// Results are cached by the predicate's canonical rendering, so the same
/// resolved predicate queried twice within one correlation epoch is served
/// from memory. The cache must be reset at every qualifier reinitialization,
/// in lockstep with the correlation store, or it would return matches from a
/// stale epoch.
pub struct DataManager {
    store: Box<dyn EventStore>,
    cache: Mutex<HashMap<String, EventGroup>>,
    capacity: usize,
}

impl DataManager {
    pub fn new(store: Box<dyn EventStore>, capacity: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn matching_instances(
        &self,
        predicate: &Predicate,
        restrict_ids: Option<&[u64]>,
    ) -> EngineResult<EventGroup> {
        let key = predicate.render(restrict_ids);
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| EngineError::store("query cache poisoned"))?;
            if let Some(hit) = cache.get(&key) {
                trace!("query cache hit: {key}");
                return Ok(hit.clone());
            }
        }
        let result = self.store.matching_instances(predicate, restrict_ids)?;
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| EngineError::store("query cache poisoned"))?;
        if cache.len() >= self.capacity {
            debug!("query cache at capacity ({}), clearing", self.capacity);
            cache.clear();
        }
        cache.insert(key, result.clone());
        Ok(result)
    }

    pub fn event(&self, id: u64) -> EngineResult<Option<Event>> {
        self.store.event(id)
    }

    pub fn attribute_names(&self, event_type: &str) -> Vec<String> {
        self.store.attribute_names(event_type)
    }

    pub fn event_types(&self) -> Vec<String> {
        self.store.event_types()
    }

    /// Drop every cached result. Called at each correlation-epoch boundary.
    pub fn reset_query_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_queries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}
