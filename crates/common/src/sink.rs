//! The instance-sink seam between the streaming/editing core and a
//! rendering backend.
//!
//! The core mutates tiles the same way regardless of how instances end up on
//! screen. A backend that batches instanced draws can ignore these calls and
//! consume the sorted render buffer instead; a backend that spawns one live
//! entity per instance mirrors every call. Either way the core never
//! branches on rendering mode.

use crate::types::{TileCoords, Transform};
use glam::Mat4;

/// Receives instance-level mutations for a stream.
///
/// Indices passed to [`InstanceSink::remove`] refer to the tile's per-preset
/// list at the moment of the call; callers removing several instances from
/// one list do so in descending index order so earlier removals never shift
/// later indices.
pub trait InstanceSink: Send {
    /// An instance was appended to `coords`' list for `preset_index`.
    fn append(
        &mut self,
        coords: TileCoords,
        preset_index: usize,
        local_to_stream: &Transform,
        world: &Transform,
    );

    /// The instance at `instance_index` was removed from `coords`' list for
    /// `preset_index`.
    fn remove(&mut self, coords: TileCoords, preset_index: usize, instance_index: usize);

    /// The whole tile left memory (eviction or shutdown).
    fn clear_tile(&mut self, coords: TileCoords);

    /// The stream's parent transform changed; world-space mirrors of
    /// stream-local instances need refreshing.
    fn stream_transform_changed(&mut self, local_to_world: &Mat4) {
        let _ = local_to_world;
    }
}

/// Sink that drops every notification. The default for streams whose backend
/// renders from the LOD-sorted buffer.
#[derive(Debug, Default)]
pub struct NoopSink;

impl InstanceSink for NoopSink {
    fn append(&mut self, _: TileCoords, _: usize, _: &Transform, _: &Transform) {}

    fn remove(&mut self, _: TileCoords, _: usize, _: usize) {}

    fn clear_tile(&mut self, _: TileCoords) {}
}
