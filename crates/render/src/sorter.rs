//! The background LOD sort driver.
//!
//! One sort pass per stream may be in flight at a time. A pass snapshots the
//! tile store under its lock, buckets everything off-thread, and publishes
//! the finished buffer through the render slot; the consumer keeps reading
//! the previous buffer until the swap, and the swap can never tear.

use crate::lod::{RenderBuffer, sort_snapshot};
use crate::slot::RenderSlot;
use glam::{Mat4, Vec3};
use scatterspace_common::Camera;
use scatterspace_stream::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owns the published buffer and the single-pass guard for one stream.
pub struct LodSorter {
    slot: Arc<RenderSlot<RenderBuffer>>,
    is_sorting: Arc<AtomicBool>,
    camera_local_at_last_sort: Option<Vec3>,
    transform_at_last_sort: Option<Mat4>,
}

impl LodSorter {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RenderSlot::new()),
            is_sorting: Arc::new(AtomicBool::new(false)),
            camera_local_at_last_sort: None,
            transform_at_last_sort: None,
        }
    }

    /// The most recently published buffer. Never a partially sorted one.
    pub fn buffer(&self) -> Option<Arc<RenderBuffer>> {
        self.slot.latest()
    }

    /// Shared handle to the publication slot, for a renderer that polls it
    /// directly.
    pub fn slot(&self) -> Arc<RenderSlot<RenderBuffer>> {
        self.slot.clone()
    }

    pub fn is_sorting(&self) -> bool {
        self.is_sorting.load(Ordering::Acquire)
    }

    fn should_sort(&self, stream: &Stream, camera_local: Vec3) -> bool {
        if stream.is_sort_dirty() {
            return true;
        }

        let camera_moved = match self.camera_local_at_last_sort {
            None => true,
            Some(previous) => {
                previous.distance(camera_local)
                    > stream.config.instance_sort_camera_movement_threshold
            }
        };
        if camera_moved {
            return true;
        }

        let current = stream.transforms().local_to_world;
        match self.transform_at_last_sort {
            None => true,
            Some(previous) => previous != current,
        }
    }

    /// Kick off a background sort pass when one is due and none is in
    /// flight. Returns whether a pass started.
    pub fn maybe_start_sort(&mut self, stream: &Stream, camera: &Camera) -> bool {
        if self.is_sorting() {
            return false;
        }

        let camera_local = stream.camera_local_position(camera);
        if !self.should_sort(stream, camera_local) {
            return false;
        }

        let local_to_world = stream.transforms().local_to_world;
        stream.take_sort_dirty();
        self.camera_local_at_last_sort = Some(camera_local);
        self.transform_at_last_sort = Some(local_to_world);
        self.is_sorting.store(true, Ordering::Release);

        let snapshot = stream.snapshot_tiles();
        let presets = stream.presets.clone();
        let camera_world = camera.position;
        let slot = self.slot.clone();
        let flag = self.is_sorting.clone();

        let spawned = std::thread::Builder::new()
            .name("scatter-lod-sort".into())
            .spawn(move || {
                let buffer = sort_snapshot(&snapshot, &presets, camera_world, &local_to_world);
                tracing::trace!(
                    tiles = buffer.tiles.len(),
                    instances = buffer.total_instances(),
                    "lod sort pass complete"
                );
                slot.publish(Arc::new(buffer));
                flag.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn lod sort thread");
            self.is_sorting.store(false, Ordering::Release);
            stream.mark_sort_dirty();
            return false;
        }

        true
    }

    /// Synchronous pass: sort and publish on the calling thread. Used by the
    /// CLI demo and tests where background timing is noise.
    pub fn sort_blocking(&mut self, stream: &Stream, camera: &Camera) -> Arc<RenderBuffer> {
        let camera_local = stream.camera_local_position(camera);
        let local_to_world = stream.transforms().local_to_world;
        stream.take_sort_dirty();
        self.camera_local_at_last_sort = Some(camera_local);
        self.transform_at_last_sort = Some(local_to_world);

        let snapshot = stream.snapshot_tiles();
        let buffer = Arc::new(sort_snapshot(
            &snapshot,
            &stream.presets,
            camera.position,
            &local_to_world,
        ));
        self.slot.publish(buffer.clone());
        buffer
    }
}

impl Default for LodSorter {
    fn default() -> Self {
        Self::new()
    }
}
