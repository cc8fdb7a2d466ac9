//! The per-field streaming aggregate.
//!
//! A `Stream` owns everything one independently-streamed scatter field
//! needs: its configuration, preset catalogue, transform state, the tile
//! store behind its mutex, the instance sink, lifecycle flags, and the
//! outgoing event pipe. It is shared across the tick driver, the brush
//! processor thread, and the LOD sorter as `Arc<Stream>`.

use crate::events::{StreamEvent, StreamEvents};
use crate::store::TileStore;
use crossbeam_channel::Receiver;
use glam::{Mat4, Vec3};
use scatterspace_common::{Aabb, Camera, Frustum, InstanceSink, NoopSink, PresetCatalogue, TileCoords, Transform};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

/// Unique identity of an active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Static configuration for one stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Names the stream's cache subdirectory.
    pub name: String,
    pub cache_dir: PathBuf,
    pub tile_width: f32,
    pub max_tiles_loaded_per_frame: usize,
    /// Stream-local distance the camera must move before another streaming
    /// pass runs.
    pub streaming_camera_movement_threshold: f32,
    /// Stream-local distance the camera must move before instances are
    /// re-sorted into LOD bands.
    pub instance_sort_camera_movement_threshold: f32,
    /// Multiplier of the farthest preset draw distance giving the streaming
    /// radius.
    pub max_lod_distance_multiplier: f32,
    /// Background threads servicing tile cache reads.
    pub load_worker_count: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "scatter".to_string(),
            cache_dir: PathBuf::from("scatterspace-cache"),
            tile_width: 256.0,
            max_tiles_loaded_per_frame: 10,
            streaming_camera_movement_threshold: 1.0,
            instance_sort_camera_movement_threshold: 1.0,
            max_lod_distance_multiplier: 1.2,
            load_worker_count: 2,
        }
    }
}

/// Transform state refreshed once per tick.
#[derive(Debug, Clone, Copy)]
pub struct StreamTransforms {
    pub local_to_world: Mat4,
    pub world_to_local: Mat4,
    pub previous_local_to_world: Mat4,
    /// Camera frustum carried into stream-local space, for the renderer's
    /// culling; the streamer itself does not use it.
    pub local_frustum: Option<Frustum>,
}

impl Default for StreamTransforms {
    fn default() -> Self {
        Self {
            local_to_world: Mat4::IDENTITY,
            world_to_local: Mat4::IDENTITY,
            previous_local_to_world: Mat4::IDENTITY,
            local_frustum: None,
        }
    }
}

impl StreamTransforms {
    /// Whether the stream's parent moved, rotated, or rescaled since the
    /// previous tick beyond a small tolerance.
    pub fn has_moved(&self) -> bool {
        let (scale_a, rot_a, pos_a) = self.local_to_world.to_scale_rotation_translation();
        let (scale_b, rot_b, pos_b) = self.previous_local_to_world.to_scale_rotation_translation();
        pos_a.distance(pos_b) > 0.01
            || rot_a.angle_between(rot_b) > 0.01_f32.to_radians()
            || scale_a.distance(scale_b) > 0.01
    }
}

/// Read-only copy of a tile taken for the LOD sorter.
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub coords: TileCoords,
    pub render_bounds: Aabb,
    pub instances: Vec<Vec<Transform>>,
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One independently-streamed scatter field.
pub struct Stream {
    id: StreamId,
    pub config: StreamConfig,
    pub presets: PresetCatalogue,
    store: Mutex<TileStore>,
    transforms: RwLock<StreamTransforms>,
    sink: Mutex<Box<dyn InstanceSink>>,
    events: StreamEvents,
    active: AtomicBool,
    /// Set whenever tile contents change; cleared by the sorter when it
    /// picks the change up.
    sort_buffers_dirty: AtomicBool,
}

impl Stream {
    pub fn new(config: StreamConfig, presets: PresetCatalogue) -> Self {
        Self::with_sink(config, presets, Box::new(NoopSink))
    }

    pub fn with_sink(
        config: StreamConfig,
        presets: PresetCatalogue,
        sink: Box<dyn InstanceSink>,
    ) -> Self {
        Self {
            id: StreamId::new(),
            config,
            presets,
            store: Mutex::new(TileStore::new()),
            transforms: RwLock::new(StreamTransforms::default()),
            sink: Mutex::new(sink),
            events: StreamEvents::new(),
            active: AtomicBool::new(true),
            sort_buffers_dirty: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Streaming radius: farthest preset draw distance times the configured
    /// multiplier.
    pub fn streaming_distance(&self) -> f32 {
        self.presets.farthest_draw_distance() * self.config.max_lod_distance_multiplier
    }

    pub fn tile_file_path(&self, coords: TileCoords) -> PathBuf {
        scatterspace_persist::tile_file_path(&self.config.cache_dir, &self.config.name, coords)
    }

    /// Exclusive access to the tile store. This mutex is the stream's
    /// single-writer discipline: streamer flush/load-apply, brush mutation,
    /// and shutdown all serialize through it. Held for bookkeeping and
    /// persistence sweeps, never across placement computation or cache
    /// reads.
    pub fn lock_store(&self) -> MutexGuard<'_, TileStore> {
        lock_ignore_poison(&self.store)
    }

    /// Non-blocking variant used where contention means "skip this tick".
    pub fn try_lock_store(&self) -> Option<MutexGuard<'_, TileStore>> {
        match self.store.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    /// The rendering backend's instance sink. Locked after the store where
    /// both are held.
    pub fn sink(&self) -> MutexGuard<'_, Box<dyn InstanceSink>> {
        lock_ignore_poison(&self.sink)
    }

    pub fn transforms(&self) -> RwLockReadGuard<'_, StreamTransforms> {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh transform state for this tick. Returns whether the parent
    /// transform moved since the previous tick.
    pub fn update_transforms(&self, local_to_world: Mat4, camera: Option<&Camera>) -> bool {
        let mut t = self
            .transforms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        t.previous_local_to_world = t.local_to_world;
        t.local_to_world = local_to_world;
        t.world_to_local = local_to_world.inverse();
        t.local_frustum = camera
            .and_then(|c| c.frustum)
            .map(|f| f.transformed_by(&local_to_world));
        t.has_moved()
    }

    /// Camera position carried into stream-local space.
    pub fn camera_local_position(&self, camera: &Camera) -> Vec3 {
        self.transforms()
            .world_to_local
            .transform_point3(camera.position)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flag the stream as ended. Pending brush strokes observe this and
    /// drop; the streamer's shutdown path unloads everything.
    pub fn shut_down(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn mark_sort_dirty(&self) {
        self.sort_buffers_dirty.store(true, Ordering::Release);
    }

    pub fn is_sort_dirty(&self) -> bool {
        self.sort_buffers_dirty.load(Ordering::Acquire)
    }

    /// Clear-and-return of the sort-dirty flag, used by the sorter when a
    /// pass actually starts.
    pub fn take_sort_dirty(&self) -> bool {
        self.sort_buffers_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn emit(&self, event: StreamEvent) {
        self.events.emit(event);
    }

    pub fn events(&self) -> &Receiver<StreamEvent> {
        self.events.receiver()
    }

    /// Copy of every resident tile's coords, bounds, and instance lists,
    /// taken under the store lock. The sorter works from this snapshot so it
    /// never races tile mutation.
    pub fn snapshot_tiles(&self) -> Vec<TileSnapshot> {
        let store = self.lock_store();
        store
            .tiles()
            .map(|tile| TileSnapshot {
                coords: tile.coords,
                render_bounds: tile.render_bounds,
                instances: tile.instances.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatterspace_common::{LodBand, ScatterPreset};

    fn one_preset() -> PresetCatalogue {
        PresetCatalogue::new(vec![ScatterPreset::new(
            "pine",
            vec![LodBand::new(50.0, 1.0), LodBand::new(200.0, 0.5)],
        )])
    }

    #[test]
    fn streaming_distance_uses_multiplier() {
        let stream = Stream::new(
            StreamConfig {
                max_lod_distance_multiplier: 1.2,
                ..StreamConfig::default()
            },
            one_preset(),
        );
        assert!((stream.streaming_distance() - 240.0).abs() < 1e-3);
    }

    #[test]
    fn transform_update_reports_movement() {
        let stream = Stream::new(StreamConfig::default(), one_preset());
        assert!(!stream.update_transforms(Mat4::IDENTITY, None));
        let moved = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        assert!(stream.update_transforms(moved, None));
        // No further movement.
        assert!(!stream.update_transforms(moved, None));
    }

    #[test]
    fn camera_position_maps_into_stream_space() {
        let stream = Stream::new(StreamConfig::default(), one_preset());
        let parent = Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0));
        stream.update_transforms(parent, None);

        let camera = Camera::at(Vec3::new(110.0, 0.0, 0.0));
        let local = stream.camera_local_position(&camera);
        assert!(local.abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn camera_frustum_is_carried_into_stream_space() {
        use scatterspace_common::{Frustum, Plane};

        let stream = Stream::new(StreamConfig::default(), one_preset());
        let parent = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));

        // World-space half-space y >= 2.
        let camera = Camera {
            position: Vec3::ZERO,
            frustum: Some(Frustum {
                planes: [Plane::new(Vec3::Y, -2.0); 6],
            }),
        };
        stream.update_transforms(parent, Some(&camera));

        let local = stream.transforms().local_frustum.unwrap();
        // Local y = 1 maps to world y = 2, exactly on the plane.
        assert!(local.planes[0].signed_distance(Vec3::new(0.0, 1.0, 0.0)).abs() < 1e-5);
        assert!(local.planes[0].signed_distance(Vec3::new(0.0, 5.0, 0.0)) > 0.0);
    }

    #[test]
    fn sort_dirty_take_clears_flag() {
        let stream = Stream::new(StreamConfig::default(), one_preset());
        stream.mark_sort_dirty();
        assert!(stream.take_sort_dirty());
        assert!(!stream.is_sort_dirty());
    }

    #[test]
    fn snapshot_copies_instances() {
        let stream = Stream::new(StreamConfig::default(), one_preset());
        {
            let mut store = stream.lock_store();
            let tile = store.get_or_create(TileCoords::new(0, 0), 1, 256.0);
            tile.instances[0].push(Transform::default());
        }
        let snapshot = stream.snapshot_tiles();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].instances[0].len(), 1);
    }
}
