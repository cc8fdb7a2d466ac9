//! LOD-band bucketing and density thinning.
//!
//! Per tile, per preset: when the tile's whole squared-distance range fits
//! inside one band's interval, every instance goes there without individual
//! checks. Otherwise each instance is classified into the first band whose
//! draw distance covers it. Bands are contiguous intervals
//! `[0, d0), [d0, d1), ...` ordered by increasing draw distance.
//!
//! Thinning is a deterministic stride over the instance list, stable frame
//! to frame for a static list, unlike random sampling.

use glam::{Mat4, Vec3};
use scatterspace_common::{Aabb, PresetCatalogue, TileCoords, Transform, grid};
use scatterspace_stream::TileSnapshot;

/// One tile's instances grouped by preset, then by LOD band, in stream-local
/// space. The consuming backend applies the stream's transform when drawing.
#[derive(Debug, Clone)]
pub struct TileRenderData {
    pub coords: TileCoords,
    pub render_bounds: Aabb,
    /// `banded[preset_index][band_index]` -> kept transforms.
    pub banded: Vec<Vec<Vec<Transform>>>,
}

impl TileRenderData {
    pub fn instance_count(&self) -> usize {
        self.banded
            .iter()
            .flat_map(|preset| preset.iter())
            .map(Vec::len)
            .sum()
    }

    pub fn band_count(&self, preset_index: usize, band_index: usize) -> usize {
        self.banded
            .get(preset_index)
            .and_then(|bands| bands.get(band_index))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// A complete sorted pass over one stream, ready for the renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderBuffer {
    /// Ordered by tile coords for stable iteration.
    pub tiles: Vec<TileRenderData>,
}

impl RenderBuffer {
    pub fn total_instances(&self) -> usize {
        self.tiles.iter().map(TileRenderData::instance_count).sum()
    }

    pub fn tile(&self, coords: TileCoords) -> Option<&TileRenderData> {
        self.tiles.iter().find(|t| t.coords == coords)
    }
}

/// Deterministic stride thinning: density 1 keeps everything, 0 keeps
/// nothing, anything between keeps every `stride`-th instance.
///
/// The stride is clamped so densities approaching zero degrade to "keep one
/// instance" instead of dividing by a value that rounds to zero.
pub fn keep_instance(index: usize, total: usize, density: f32) -> bool {
    if density >= 1.0 {
        return true;
    }
    if density <= 0.0 || total == 0 {
        return false;
    }
    let kept = (total as f32 * density).floor().max(1.0);
    let stride = ((total as f32 / kept).floor() as usize).max(1);
    index % stride == 0
}

/// Bucket one tile's instances into LOD bands relative to `camera_world`.
pub fn sort_tile(
    snapshot: &TileSnapshot,
    presets: &PresetCatalogue,
    camera_world: Vec3,
    local_to_world: &Mat4,
) -> TileRenderData {
    let (range_min_sq, range_max_sq) =
        grid::distance_range_sq(&snapshot.render_bounds, camera_world, local_to_world);

    let empty: Vec<Transform> = Vec::new();
    let mut banded = Vec::with_capacity(presets.len());

    for (preset_index, preset) in presets.presets.iter().enumerate() {
        let bands = &preset.lod_bands;
        let mut per_band: Vec<Vec<Transform>> = vec![Vec::new(); bands.len()];
        let instances = snapshot.instances.get(preset_index).unwrap_or(&empty);

        if bands.is_empty() || instances.is_empty() {
            banded.push(per_band);
            continue;
        }

        let total = instances.len();

        // Cheap path: the entire tile sits inside one band's interval.
        let mut whole_tile_band = None;
        let mut previous_sq = 0.0_f32;
        for (band_index, band) in bands.iter().enumerate() {
            let draw_sq = band.draw_distance * band.draw_distance;
            if range_min_sq >= previous_sq && range_max_sq < draw_sq {
                whole_tile_band = Some(band_index);
                break;
            }
            previous_sq = draw_sq;
        }

        match whole_tile_band {
            Some(band_index) => {
                let density = bands[band_index].density;
                for (i, instance) in instances.iter().enumerate() {
                    if keep_instance(i, total, density) {
                        per_band[band_index].push(*instance);
                    }
                }
            }
            None => {
                for (i, instance) in instances.iter().enumerate() {
                    let world_position = local_to_world.transform_point3(instance.position);
                    let dist_sq = world_position.distance_squared(camera_world);

                    for (band_index, band) in bands.iter().enumerate() {
                        let draw_sq = band.draw_distance * band.draw_distance;
                        if dist_sq <= draw_sq {
                            if keep_instance(i, total, band.density) {
                                per_band[band_index].push(*instance);
                            }
                            break;
                        }
                        // Past the last band: the instance is out of draw
                        // range and is dropped.
                    }
                }
            }
        }

        banded.push(per_band);
    }

    TileRenderData {
        coords: snapshot.coords,
        render_bounds: snapshot.render_bounds,
        banded,
    }
}

/// Sort a whole snapshot into a render buffer, tiles ordered by coords.
pub fn sort_snapshot(
    snapshot: &[TileSnapshot],
    presets: &PresetCatalogue,
    camera_world: Vec3,
    local_to_world: &Mat4,
) -> RenderBuffer {
    let mut tiles: Vec<TileRenderData> = snapshot
        .iter()
        .map(|tile| sort_tile(tile, presets, camera_world, local_to_world))
        .collect();
    tiles.sort_by_key(|t| (t.coords.x, t.coords.y));
    RenderBuffer { tiles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scatterspace_common::{LodBand, ScatterPreset};

    fn two_band_presets() -> PresetCatalogue {
        PresetCatalogue::new(vec![ScatterPreset::new(
            "pine",
            vec![LodBand::new(50.0, 1.0), LodBand::new(200.0, 0.5)],
        )])
    }

    /// Ten instances on a ring of radius 40 around the origin, with bounds
    /// the way the tile store computes them.
    fn ring_snapshot() -> TileSnapshot {
        let mut instances = Vec::new();
        let mut bounds: Option<Aabb> = None;
        for i in 0..10 {
            let angle = i as f32 / 10.0 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos() * 40.0, 0.0, angle.sin() * 40.0);
            instances.push(Transform::from_position(position));
            match &mut bounds {
                None => bounds = Some(Aabb::at_point(position)),
                Some(b) => b.encapsulate(position),
            }
        }
        TileSnapshot {
            coords: TileCoords::new(0, 0),
            render_bounds: bounds.unwrap(),
            instances: vec![instances],
        }
    }

    #[test]
    fn thinning_is_deterministic() {
        let a: Vec<usize> = (0..100).filter(|&i| keep_instance(i, 100, 0.3)).collect();
        let b: Vec<usize> = (0..100).filter(|&i| keep_instance(i, 100, 0.3)).collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.len() < 100);
    }

    #[test]
    fn thinning_extremes() {
        assert!((0..10).all(|i| keep_instance(i, 10, 1.0)));
        assert!(!(0..10).any(|i| keep_instance(i, 10, 0.0)));
    }

    #[test]
    fn half_density_keeps_every_other() {
        let kept: Vec<usize> = (0..10).filter(|&i| keep_instance(i, 10, 0.5)).collect();
        assert_eq!(kept, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn tiny_density_keeps_at_least_one() {
        let kept: Vec<usize> = (0..50).filter(|&i| keep_instance(i, 50, 0.001)).collect();
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn near_camera_tile_lands_in_first_band() {
        let snapshot = ring_snapshot();
        let presets = two_band_presets();
        let sorted = sort_tile(&snapshot, &presets, Vec3::ZERO, &Mat4::IDENTITY);

        assert_eq!(sorted.band_count(0, 0), 10);
        assert_eq!(sorted.band_count(0, 1), 0);
    }

    #[test]
    fn distant_camera_reassigns_to_second_band_and_thins() {
        let snapshot = ring_snapshot();
        let presets = two_band_presets();
        // Far enough that every instance falls in the (50, 200] interval.
        let sorted = sort_tile(
            &snapshot,
            &presets,
            Vec3::new(150.0, 0.0, 0.0),
            &Mat4::IDENTITY,
        );

        assert_eq!(sorted.band_count(0, 0), 0);
        assert_eq!(sorted.band_count(0, 1), 5);
    }

    #[test]
    fn beyond_last_band_nothing_is_kept() {
        let snapshot = ring_snapshot();
        let presets = two_band_presets();
        let sorted = sort_tile(
            &snapshot,
            &presets,
            Vec3::new(600.0, 0.0, 0.0),
            &Mat4::IDENTITY,
        );
        assert_eq!(sorted.instance_count(), 0);
    }

    #[test]
    fn straddling_tile_classifies_per_instance() {
        // One instance near the camera, one far: the tile range straddles
        // the first band boundary, forcing per-instance classification. The
        // far instance sits at index 0 so the second band's 0.5-density
        // stride keeps it.
        let near = Transform::from_position(Vec3::new(10.0, 0.0, 0.0));
        let far = Transform::from_position(Vec3::new(150.0, 0.0, 0.0));
        let mut bounds = Aabb::at_point(near.position);
        bounds.encapsulate(far.position);
        let snapshot = TileSnapshot {
            coords: TileCoords::new(0, 0),
            render_bounds: bounds,
            instances: vec![vec![far, near]],
        };

        let sorted = sort_tile(&snapshot, &two_band_presets(), Vec3::ZERO, &Mat4::IDENTITY);
        assert_eq!(sorted.band_count(0, 0), 1);
        assert_eq!(sorted.band_count(0, 1), 1);
    }

    #[test]
    fn stream_transform_shifts_classification() {
        let snapshot = ring_snapshot();
        let presets = two_band_presets();
        // Pushing the whole stream 150 units away has the same effect as
        // moving the camera there.
        let local_to_world = Mat4::from_translation(Vec3::new(150.0, 0.0, 0.0));
        let sorted = sort_tile(&snapshot, &presets, Vec3::ZERO, &local_to_world);
        assert_eq!(sorted.band_count(0, 0), 0);
        assert_eq!(sorted.band_count(0, 1), 5);
    }

    #[test]
    fn missing_preset_list_is_empty_not_a_fault() {
        let snapshot = TileSnapshot {
            coords: TileCoords::new(0, 0),
            render_bounds: Aabb::at_point(Vec3::ZERO),
            instances: vec![], // stale: fewer lists than presets
        };
        let sorted = sort_tile(&snapshot, &two_band_presets(), Vec3::ZERO, &Mat4::IDENTITY);
        assert_eq!(sorted.instance_count(), 0);
    }

    #[test]
    fn sort_snapshot_orders_tiles() {
        let make = |x: i32| TileSnapshot {
            coords: TileCoords::new(x, 0),
            render_bounds: Aabb::at_point(Vec3::ZERO),
            instances: vec![],
        };
        let buffer = sort_snapshot(
            &[make(3), make(-1), make(0)],
            &two_band_presets(),
            Vec3::ZERO,
            &Mat4::IDENTITY,
        );
        let xs: Vec<i32> = buffer.tiles.iter().map(|t| t.coords.x).collect();
        assert_eq!(xs, vec![-1, 0, 3]);
    }
}
