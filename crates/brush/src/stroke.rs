//! Stroke queueing and application.
//!
//! User input enqueues strokes; a background processor thread computes
//! placement points off the tick, then mutates the tile store under its
//! mutex. After a run of consecutive strokes the processor flushes dirty
//! tiles itself, so a long fast stroke can never starve persistence.

use crate::config::{BrushConfig, StrokeProcessing};
use crate::placement::{PlacementMode, Stroke, placement_transforms};
use crate::surface::SurfaceQuery;
use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::{Quat, Vec3};
use scatterspace_common::{TileCoords, Transform, grid};
use scatterspace_stream::{Stream, StreamEvent, flush_dirty_tiles};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Explicit one-item drop, bypassing the lattice/noise pipeline.
#[derive(Debug, Clone, Copy)]
pub struct SinglePlacement {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub preset_index: usize,
}

enum BrushJob {
    Stroke(Stroke),
    Single(SinglePlacement),
    InputReleased,
}

/// Handle to the background stroke processor for one stream.
pub struct BrushProcessor {
    tx: Sender<BrushJob>,
    input_held: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BrushProcessor {
    pub fn spawn(
        stream: Arc<Stream>,
        config: BrushConfig,
        surface: Arc<dyn SurfaceQuery>,
    ) -> Self {
        let (tx, rx) = unbounded();
        let input_held = Arc::new(AtomicBool::new(false));
        let held = input_held.clone();

        let worker = std::thread::Builder::new()
            .name("scatter-brush".into())
            .spawn(move || worker_loop(stream, config, surface, rx, held))
            .map_err(|e| tracing::error!(error = %e, "failed to spawn brush worker"))
            .ok();

        Self {
            tx,
            input_held,
            worker,
        }
    }

    pub fn enqueue_stroke(&self, stroke: Stroke) {
        let _ = self.tx.send(BrushJob::Stroke(stroke));
    }

    pub fn enqueue_single(&self, placement: SinglePlacement) {
        let _ = self.tx.send(BrushJob::Single(placement));
    }

    /// Report the input button state. Releasing drains any strokes deferred
    /// while it was held.
    pub fn set_input_held(&self, held: bool) {
        self.input_held.store(held, Ordering::Release);
        if !held {
            let _ = self.tx.send(BrushJob::InputReleased);
        }
    }

    /// Close the queue and wait for already-enqueued work to finish.
    /// Strokes still deferred behind a held input are dropped.
    pub fn shut_down(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    stream: Arc<Stream>,
    config: BrushConfig,
    surface: Arc<dyn SurfaceQuery>,
    rx: Receiver<BrushJob>,
    input_held: Arc<AtomicBool>,
) {
    let mut deferred: VecDeque<Stroke> = VecDeque::new();
    let mut consecutive = 0usize;

    while let Ok(job) = rx.recv() {
        match job {
            BrushJob::Single(placement) => {
                apply_single(&stream, &placement);
            }
            BrushJob::Stroke(stroke) => match config.stroke_processing {
                StrokeProcessing::Immediate => {
                    process_stroke(&stream, &config, surface.as_ref(), &stroke, &mut consecutive);
                }
                StrokeProcessing::DeferredToEndOfStroke => {
                    deferred.push_back(stroke);
                    if !input_held.load(Ordering::Acquire) {
                        drain_deferred(
                            &stream,
                            &config,
                            surface.as_ref(),
                            &mut deferred,
                            &mut consecutive,
                        );
                    }
                }
            },
            BrushJob::InputReleased => {
                drain_deferred(
                    &stream,
                    &config,
                    surface.as_ref(),
                    &mut deferred,
                    &mut consecutive,
                );
            }
        }

        if rx.is_empty() {
            // Batch boundary: the flush cadence restarts with the next burst.
            consecutive = 0;
        }
    }
}

fn drain_deferred(
    stream: &Stream,
    config: &BrushConfig,
    surface: &dyn SurfaceQuery,
    deferred: &mut VecDeque<Stroke>,
    consecutive: &mut usize,
) {
    while let Some(stroke) = deferred.pop_front() {
        process_stroke(stream, config, surface, &stroke, consecutive);
    }
}

fn process_stroke(
    stream: &Stream,
    config: &BrushConfig,
    surface: &dyn SurfaceQuery,
    stroke: &Stroke,
    consecutive: &mut usize,
) {
    let Some(preset) = stream.presets.get(stroke.preset_index) else {
        tracing::warn!(
            preset = stroke.preset_index,
            "stroke references unknown preset; skipping"
        );
        return;
    };

    match stroke.mode {
        PlacementMode::Add => {
            let placed = placement_transforms(config, preset, stroke, surface);
            if stream.is_active() {
                apply_add(stream, stroke.preset_index, &placed);
            }
        }
        PlacementMode::Delete => {
            if stream.is_active() {
                apply_delete(stream, stroke.preset_index, stroke.position, stroke.diameter * 0.5);
            }
        }
        PlacementMode::Replace => {
            // Compute first: the placement work runs to completion and only
            // then checks whether the stream still wants it.
            let placed = placement_transforms(config, preset, stroke, surface);
            if stream.is_active() {
                apply_delete(stream, stroke.preset_index, stroke.position, stroke.diameter * 0.5);
                apply_add(stream, stroke.preset_index, &placed);
            }
        }
    }

    *consecutive += 1;
    if *consecutive >= config.max_deferred_strokes_before_flush.max(1) {
        // Give persistence its turn before the next stroke takes the lock.
        let mut store = stream.lock_store();
        flush_dirty_tiles(stream, &mut store);
        *consecutive = 0;
    }
}

fn apply_single(stream: &Stream, placement: &SinglePlacement) {
    if !stream.is_active() {
        return;
    }
    apply_add(
        stream,
        placement.preset_index,
        &[Transform {
            position: placement.position,
            rotation: placement.rotation,
            scale: placement.scale,
        }],
    );
}

/// Insert world-space transforms into their tiles, creating tiles for
/// previously-unloaded cells. Returns the number of instances placed.
pub fn apply_add(stream: &Stream, preset_index: usize, world_transforms: &[Transform]) -> usize {
    if world_transforms.is_empty() {
        return 0;
    }

    let world_to_local = stream.transforms().world_to_local;
    let preset_count = stream.presets.len();
    let tile_width = stream.config.tile_width;

    let mut changed: HashSet<TileCoords> = HashSet::new();
    {
        let mut store = stream.lock_store();
        let mut sink = stream.sink();

        for world in world_transforms {
            let local = world.transformed_by(&world_to_local);
            let coords = grid::tile_index(local.position, tile_width);
            let tile = store.get_or_create(coords, preset_count, tile_width);
            tile.ensure_preset_count(preset_count.max(preset_index + 1));
            tile.instances[preset_index].push(local);
            sink.append(coords, preset_index, &local, world);
            changed.insert(coords);
        }

        for &coords in &changed {
            store.mark_dirty(coords);
        }
    }

    for &coords in &changed {
        stream.emit(StreamEvent::TileModified(coords));
    }
    stream.mark_sort_dirty();

    tracing::debug!(
        placed = world_transforms.len(),
        tiles = changed.len(),
        "brush add applied"
    );
    world_transforms.len()
}

/// Remove every instance of `preset_index` within `radius` of `center`
/// (world space) across all loaded tiles. Returns the number removed.
///
/// Only loaded tiles are searched; instances in tiles still streaming in are
/// untouched (see DESIGN.md on this consistency gap).
pub fn apply_delete(stream: &Stream, preset_index: usize, center: Vec3, radius: f32) -> usize {
    let local_to_world = stream.transforms().local_to_world;
    let radius_sq = radius * radius;

    let mut changed: Vec<TileCoords> = Vec::new();
    let mut removed_total = 0usize;
    {
        let mut store = stream.lock_store();
        let mut sink = stream.sink();

        for tile in store.tiles_mut() {
            let Some(instances) = tile.instances.get_mut(preset_index) else {
                continue;
            };

            let mut any_removed = false;
            // Reverse scan so removals never shift indices still to visit.
            for i in (0..instances.len()).rev() {
                let world_position = local_to_world.transform_point3(instances[i].position);
                if world_position.distance_squared(center) < radius_sq {
                    instances.remove(i);
                    sink.remove(tile.coords, preset_index, i);
                    any_removed = true;
                    removed_total += 1;
                }
            }

            if any_removed {
                changed.push(tile.coords);
            }
        }

        for &coords in &changed {
            store.mark_dirty(coords);
        }
    }

    for &coords in &changed {
        stream.emit(StreamEvent::TileModified(coords));
    }
    if !changed.is_empty() {
        stream.mark_sort_dirty();
    }

    tracing::debug!(removed = removed_total, tiles = changed.len(), "brush delete applied");
    removed_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::FlatSurface;
    use scatterspace_common::{LodBand, PresetCatalogue, ScatterPreset};
    use scatterspace_stream::StreamConfig;

    fn test_stream(cache_dir: &std::path::Path) -> Arc<Stream> {
        let presets = PresetCatalogue::new(vec![ScatterPreset::new(
            "fern",
            vec![LodBand::new(100.0, 1.0)],
        )]);
        Arc::new(Stream::new(
            StreamConfig {
                name: "brush-test".into(),
                cache_dir: cache_dir.to_path_buf(),
                tile_width: 64.0,
                ..StreamConfig::default()
            },
            presets,
        ))
    }

    fn brush_config() -> BrushConfig {
        BrushConfig {
            spacing: 2.0,
            diameter: 10.0,
            ..BrushConfig::default()
        }
    }

    fn add_stroke() -> Stroke {
        Stroke {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            diameter: 10.0,
            mode: PlacementMode::Add,
            preset_index: 0,
        }
    }

    fn total_instances(stream: &Stream) -> usize {
        stream.lock_store().tiles().map(|t| t.instance_count()).sum()
    }

    #[test]
    fn stroke_places_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        processor.enqueue_stroke(add_stroke());
        processor.shut_down();

        assert!(total_instances(&stream) > 0);
        assert!(stream.is_sort_dirty());

        // Every touched tile announced itself.
        let modified: Vec<TileCoords> = stream
            .events()
            .try_iter()
            .filter_map(|e| match e {
                StreamEvent::TileModified(coords) => Some(coords),
                _ => None,
            })
            .collect();
        assert!(!modified.is_empty());
    }

    #[test]
    fn delete_stroke_removes_everything_in_radius() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        processor.enqueue_stroke(add_stroke());
        processor.enqueue_stroke(Stroke {
            mode: PlacementMode::Delete,
            diameter: 40.0,
            ..add_stroke()
        });
        processor.shut_down();

        assert_eq!(total_instances(&stream), 0);
    }

    #[test]
    fn replace_stroke_converges_instead_of_accumulating() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        let replace = Stroke {
            mode: PlacementMode::Replace,
            ..add_stroke()
        };
        processor.enqueue_stroke(replace);
        processor.shut_down();
        let after_one = total_instances(&stream);

        let processor = BrushProcessor::spawn(
            stream.clone(),
            brush_config(),
            Arc::new(FlatSurface::new(0.0, "ground")),
        );
        processor.enqueue_stroke(replace);
        processor.enqueue_stroke(replace);
        processor.shut_down();

        assert_eq!(total_instances(&stream), after_one);
    }

    #[test]
    fn single_placement_bypasses_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        processor.enqueue_single(SinglePlacement {
            position: Vec3::new(3.0, 1.0, -3.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(2.0),
            preset_index: 0,
        });
        processor.shut_down();

        assert_eq!(total_instances(&stream), 1);
        let store = stream.lock_store();
        let tile = store.get(grid::tile_index(Vec3::new(3.0, 1.0, -3.0), 64.0)).unwrap();
        assert!(tile.instances[0][0].scale.abs_diff_eq(Vec3::splat(2.0), 1e-5));
    }

    #[test]
    fn deferred_strokes_wait_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let config = BrushConfig {
            stroke_processing: StrokeProcessing::DeferredToEndOfStroke,
            ..brush_config()
        };
        let processor = BrushProcessor::spawn(stream.clone(), config.clone(), surface.clone());
        processor.set_input_held(true);
        processor.enqueue_stroke(add_stroke());
        // Shut down with the input still held: deferred strokes are dropped.
        processor.shut_down();
        assert_eq!(total_instances(&stream), 0);

        let processor = BrushProcessor::spawn(stream.clone(), config, surface);
        processor.set_input_held(true);
        processor.enqueue_stroke(add_stroke());
        processor.set_input_held(false);
        processor.shut_down();
        assert!(total_instances(&stream) > 0);
    }

    #[test]
    fn strokes_for_ended_stream_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        stream.shut_down();
        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        processor.enqueue_stroke(add_stroke());
        processor.shut_down();

        assert_eq!(total_instances(&stream), 0);
    }

    #[test]
    fn stale_preset_index_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        let processor = BrushProcessor::spawn(stream.clone(), brush_config(), surface);
        processor.enqueue_stroke(Stroke {
            preset_index: 99,
            ..add_stroke()
        });
        processor.shut_down();

        assert_eq!(total_instances(&stream), 0);
    }

    #[test]
    fn long_stroke_runs_flush_between_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let stream = test_stream(tmp.path());
        let surface: Arc<dyn SurfaceQuery> = Arc::new(FlatSurface::new(0.0, "ground"));

        // Deferred mode drains all strokes back-to-back on release, so the
        // flush cadence kicks in mid-drain regardless of enqueue timing.
        let config = BrushConfig {
            max_deferred_strokes_before_flush: 2,
            stroke_processing: StrokeProcessing::DeferredToEndOfStroke,
            ..brush_config()
        };
        let processor = BrushProcessor::spawn(stream.clone(), config, surface);
        processor.set_input_held(true);
        for _ in 0..5 {
            processor.enqueue_stroke(add_stroke());
        }
        processor.set_input_held(false);
        processor.shut_down();

        // The interleaved flushes persisted the painted tiles to disk.
        let stream_dir = tmp.path().join(stream.name());
        assert!(stream_dir.exists());
        assert!(std::fs::read_dir(stream_dir).unwrap().count() > 0);
    }
}
