//! The per-tick streaming state machine.
//!
//! Each tick: refresh transforms, flush dirty tiles when the store lock is
//! uncontended, then, if the camera moved far enough, recompute the
//! in-range tile set, unload what fell out (persisting unsaved edits first),
//! and dispatch asynchronous loads for what came in. Completed loads are
//! applied at the top of every tick, at most `max_tiles_loaded_per_frame`
//! real loads per tick.
//!
//! Every per-tile operation is isolated: one tile failing to save or load is
//! logged and skipped, never aborting the pass for its neighbours.

use crate::loader::{LoadOutcome, LoadPool, LoadRequest, PreLoadHook};
use crate::store::{Tile, TileStore};
use crate::stream::Stream;
use crate::events::StreamEvent;
use glam::{Mat4, Vec3};
use scatterspace_common::{Camera, TileCoords, grid};
use scatterspace_persist::{CodecError, SaveOutcome, save_tile};
use std::collections::HashSet;
use std::sync::Arc;

/// Drives loading, unloading, and persistence for one stream.
pub struct Streamer {
    pool: LoadPool,
    camera_local_at_last_pass: Option<Vec3>,
    in_range: HashSet<TileCoords>,
}

impl Streamer {
    pub fn new(load_worker_count: usize) -> Self {
        Self::with_pre_load_hook(load_worker_count, None)
    }

    /// A streamer whose loads first consult `hook`; a veto marks the tile
    /// attempted-but-missing without a file check.
    pub fn with_pre_load_hook(load_worker_count: usize, hook: Option<Arc<PreLoadHook>>) -> Self {
        Self {
            pool: LoadPool::new(load_worker_count, hook),
            camera_local_at_last_pass: None,
            in_range: HashSet::new(),
        }
    }

    /// Coordinates considered in range by the most recent streaming pass.
    pub fn in_range(&self) -> &HashSet<TileCoords> {
        &self.in_range
    }

    /// Load requests dispatched but not yet serviced.
    pub fn queued_loads(&self) -> usize {
        self.pool.queued_requests()
    }

    /// Run one streaming tick for `stream`.
    ///
    /// `parent_local_to_world` is the stream's parent transform this frame.
    /// With no camera the streaming pass is skipped for the tick; completed
    /// loads and dirty flushes still proceed.
    pub fn tick(&mut self, stream: &Stream, camera: Option<&Camera>, parent_local_to_world: Mat4) {
        let moved = stream.update_transforms(parent_local_to_world, camera);
        if moved {
            stream.mark_sort_dirty();
            let local_to_world = stream.transforms().local_to_world;
            stream.sink().stream_transform_changed(&local_to_world);
        }

        self.apply_completed_loads(stream);

        if let Some(mut store) = stream.try_lock_store() {
            flush_dirty_tiles(stream, &mut store);
        }

        let Some(camera) = camera else {
            tracing::trace!(stream = %stream.id(), "no camera; skipping streaming pass");
            return;
        };

        let camera_local = stream.camera_local_position(camera);
        let should_run = match self.camera_local_at_last_pass {
            None => true,
            Some(previous) => {
                previous.distance(camera_local) > stream.config.streaming_camera_movement_threshold
            }
        };

        if should_run {
            self.run_streaming_pass(stream, camera_local);
            self.camera_local_at_last_pass = Some(camera_local);
        }
    }

    /// Treat every tile as out of range: flush, unload, and release
    /// everything, and stop accepting brush work for the stream.
    pub fn shut_down(&mut self, stream: &Stream) {
        stream.shut_down();
        self.in_range.clear();
        self.camera_local_at_last_pass = None;

        // Results still in flight belong to a dead stream; settle their
        // bookkeeping and drop them.
        while let Some(result) = self.pool.try_recv() {
            let mut store = stream.lock_store();
            store.finish_stream_in(result.coords);
            stream.emit(StreamEvent::TileStreamInComplete {
                coords: result.coords,
                loaded: false,
            });
        }

        let mut store = stream.lock_store();
        self.unload_out_of_range(stream, &mut store);
        store.prune_missing(&self.in_range);
        tracing::debug!(stream = %stream.id(), "stream shut down");
    }

    fn run_streaming_pass(&mut self, stream: &Stream, camera_local: Vec3) {
        let distance = stream.streaming_distance();
        self.in_range =
            grid::tiles_within_distance(camera_local, distance, stream.config.tile_width);

        let mut store = stream.lock_store();
        self.unload_out_of_range(stream, &mut store);
        self.dispatch_loads(stream, &mut store);
        store.prune_missing(&self.in_range);

        tracing::trace!(
            stream = %stream.id(),
            in_range = self.in_range.len(),
            loaded = store.len(),
            "streaming pass complete"
        );
    }

    fn unload_out_of_range(&self, stream: &Stream, store: &mut TileStore) {
        let to_unload: Vec<TileCoords> = store
            .loaded_coords()
            .into_iter()
            .filter(|coords| !self.in_range.contains(coords))
            .collect();

        let mut any_unloaded = false;
        for coords in to_unload {
            if store.is_dirty(coords) {
                // Unsaved edits must reach disk before the tile disappears.
                // On failure the tile stays resident and dirty for a retry.
                match persist_tile(stream, store, coords) {
                    Ok(_) => store.clear_dirty(coords),
                    Err(e) => {
                        tracing::warn!(
                            coords = %coords,
                            error = %e,
                            "eviction flush failed; keeping tile resident"
                        );
                        continue;
                    }
                }
            }

            store.remove_tile(coords);
            stream.sink().clear_tile(coords);
            any_unloaded = true;
            tracing::debug!(coords = %coords, "unloaded tile");
        }

        if any_unloaded {
            stream.mark_sort_dirty();
        }
    }

    fn dispatch_loads(&self, stream: &Stream, store: &mut TileStore) {
        for &coords in &self.in_range {
            if store.contains(coords) || store.is_streaming_in(coords) || store.is_missing(coords) {
                continue;
            }
            store.begin_stream_in(coords);
            self.pool.request(LoadRequest {
                coords,
                path: stream.tile_file_path(coords),
                preset_count: stream.presets.len(),
            });
        }
    }

    fn apply_completed_loads(&mut self, stream: &Stream) {
        let budget = stream.config.max_tiles_loaded_per_frame.max(1);
        let mut applied = 0;

        // Only real loads count toward the per-frame budget; misses and
        // failures are bookkeeping.
        while applied < budget {
            let Some(result) = self.pool.try_recv() else {
                break;
            };

            let coords = result.coords;
            let mut store = stream.lock_store();
            store.finish_stream_in(coords);

            match result.outcome {
                LoadOutcome::Loaded(lists) => {
                    applied += 1;

                    if !stream.is_active() {
                        stream.emit(StreamEvent::TileStreamInComplete {
                            coords,
                            loaded: false,
                        });
                        continue;
                    }

                    self.apply_loaded_tile(stream, &mut store, coords, lists);
                    store.clear_missing(coords);
                    stream.mark_sort_dirty();
                    stream.emit(StreamEvent::TileModified(coords));
                    stream.emit(StreamEvent::TileStreamInComplete {
                        coords,
                        loaded: true,
                    });
                }
                LoadOutcome::Missing | LoadOutcome::Vetoed | LoadOutcome::FormatFailure => {
                    store.mark_missing(coords);
                    stream.emit(StreamEvent::TileStreamInComplete {
                        coords,
                        loaded: false,
                    });
                }
                LoadOutcome::TransientFailure => {
                    // Not marked missing: a later pass retries the read.
                    stream.emit(StreamEvent::TileStreamInComplete {
                        coords,
                        loaded: false,
                    });
                }
            }
        }
    }

    fn apply_loaded_tile(
        &self,
        stream: &Stream,
        store: &mut TileStore,
        coords: TileCoords,
        lists: Vec<Vec<scatterspace_common::Transform>>,
    ) {
        let preset_count = stream.presets.len();
        let tile_width = stream.config.tile_width;
        let local_to_world = stream.transforms().local_to_world;
        let target_count = preset_count.max(lists.len());

        if store.contains(coords) {
            // The brush created this tile while its load was in flight;
            // merge the cached instances under the painted ones and keep the
            // tile dirty so the union persists.
            if let Some(existing) = store.get_mut(coords) {
                existing.ensure_preset_count(target_count);
                for (preset_index, loaded) in lists.into_iter().enumerate() {
                    existing.instances[preset_index].extend(loaded);
                }
                existing.recompute_bounds(&stream.presets, tile_width);
            }
            store.mark_dirty(coords);
        } else {
            let mut tile = Tile::new(coords, preset_count, tile_width);
            tile.instances = lists;
            tile.ensure_preset_count(target_count);
            tile.recompute_bounds(&stream.presets, tile_width);
            store.insert_tile(tile);
        }

        let Some(tile) = store.get(coords) else {
            return;
        };

        let mut sink = stream.sink();
        for (preset_index, instances) in tile.instances.iter().enumerate() {
            for local in instances {
                let world = local.transformed_by(&local_to_world);
                sink.append(coords, preset_index, local, &world);
            }
        }

        tracing::debug!(coords = %coords, count = tile.instance_count(), "tile streamed in");
    }
}

/// Persist one tile: recompute bounds from current instances, then write the
/// cache file (or delete it when the tile emptied).
fn persist_tile(
    stream: &Stream,
    store: &mut TileStore,
    coords: TileCoords,
) -> Result<SaveOutcome, CodecError> {
    let path = stream.tile_file_path(coords);
    let presets = &stream.presets;
    let tile_width = stream.config.tile_width;
    let Some(tile) = store.get_mut(coords) else {
        return Ok(SaveOutcome::Nothing);
    };
    tile.recompute_bounds(presets, tile_width);
    save_tile(&path, &tile.instances)
}

/// Flush every dirty tile that is not mid-load. Save failures are logged and
/// the tile stays dirty for the next sweep. Returns how many tiles flushed.
///
/// Also called from the brush processor between stroke batches, so a long
/// stroke cannot starve persistence.
pub fn flush_dirty_tiles(stream: &Stream, store: &mut TileStore) -> usize {
    let mut flushed = 0;

    for coords in store.dirty_coords() {
        if store.is_streaming_in(coords) {
            continue;
        }

        match persist_tile(stream, store, coords) {
            Ok(outcome) => {
                store.clear_dirty(coords);
                // A freshly painted tile may have been probed and marked
                // missing before it existed on disk; it is loadable now.
                store.clear_missing(coords);
                flushed += 1;
                tracing::trace!(coords = %coords, ?outcome, "flushed tile");
            }
            Err(e) => {
                tracing::warn!(coords = %coords, error = %e, "tile flush failed; will retry");
            }
        }
    }

    flushed
}
