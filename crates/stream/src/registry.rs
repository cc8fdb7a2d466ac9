//! Explicit registry of active streams.
//!
//! Owned by whatever owns the per-tick driver; streams are registered when
//! started and unregistered on shutdown. Cross-cutting code looks streams up
//! by id here instead of through any process-wide state.

use crate::stream::{Stream, StreamId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, Arc<Stream>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stream: Arc<Stream>) -> StreamId {
        let id = stream.id();
        tracing::debug!(stream = %id, name = stream.name(), "registered stream");
        self.streams.insert(id, stream);
        id
    }

    pub fn unregister(&mut self, id: StreamId) -> Option<Arc<Stream>> {
        let removed = self.streams.remove(&id);
        if removed.is_some() {
            tracing::debug!(stream = %id, "unregistered stream");
        }
        removed
    }

    pub fn get(&self, id: StreamId) -> Option<&Arc<Stream>> {
        self.streams.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stream>> {
        self.streams.values()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamConfig;
    use scatterspace_common::PresetCatalogue;

    #[test]
    fn register_lookup_unregister() {
        let mut registry = StreamRegistry::new();
        let stream = Arc::new(Stream::new(
            StreamConfig::default(),
            PresetCatalogue::default(),
        ));
        let id = registry.register(stream.clone());

        assert!(registry.get(id).is_some());
        assert_eq!(registry.len(), 1);

        let removed = registry.unregister(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(registry.is_empty());
        assert!(registry.unregister(id).is_none());
    }
}
