//! Grid math for the tile partition.
//!
//! Tiles are addressed on the ground plane only: a position maps to the tile
//! whose cell contains its (x, z) projection, and tile bounds are given an
//! effectively unbounded vertical extent since placed items may sit at any
//! height.

use crate::types::{Aabb, TileCoords};
use glam::{Mat4, Vec2, Vec3};
use std::collections::HashSet;

/// Half-height assigned to tile bounds; instance heights are unconstrained.
pub const TILE_VERTICAL_EXTENT: f32 = 10_000.0;

/// Tile containing `position` (stream-local space, ground-plane projection).
pub fn tile_index(position: Vec3, tile_width: f32) -> TileCoords {
    TileCoords {
        x: (position.x / tile_width).ceil() as i32,
        y: (position.z / tile_width).ceil() as i32,
    }
}

/// Center of a tile on the ground plane (y = 0), inverse of [`tile_index`]
/// at cell granularity.
pub fn tile_center(coords: TileCoords, tile_width: f32) -> Vec3 {
    let half = tile_width * 0.5;
    Vec3::new(
        coords.x as f32 * tile_width - half,
        0.0,
        coords.y as f32 * tile_width - half,
    )
}

/// Bounds of a tile: square footprint, vertically unbounded for all
/// practical purposes.
pub fn tile_bounds(coords: TileCoords, tile_width: f32) -> Aabb {
    let half = tile_width * 0.5;
    Aabb::new(
        tile_center(coords, tile_width),
        Vec3::new(half, TILE_VERTICAL_EXTENT, half),
    )
}

/// Squared distance range `(min, max)` from `world_position` to `bounds`
/// after transforming the bounds into world space.
///
/// The max comes from the farthest of the eight corners. The min uses the
/// closest point on the box rather than corners, so it is correct when the
/// camera sits over or inside the bounds.
pub fn distance_range_sq(bounds: &Aabb, world_position: Vec3, local_to_world: &Mat4) -> (f32, f32) {
    let world_bounds = bounds.transformed_by(local_to_world);
    let max = world_bounds
        .corners()
        .iter()
        .map(|c| c.distance_squared(world_position))
        .fold(0.0_f32, f32::max);
    let min = world_bounds
        .closest_point(world_position)
        .distance_squared(world_position);
    (min, max)
}

/// All tile coordinates whose cells fall within `distance` of `center`
/// (stream-local space). A tile counts as in range when the squared planar
/// distance from its center to `center`, less half the tile width, is under
/// `distance` squared.
pub fn tiles_within_distance(center: Vec3, distance: f32, tile_width: f32) -> HashSet<TileCoords> {
    let mut result = HashSet::new();
    if distance <= 0.0 || tile_width <= 0.0 {
        return result;
    }

    let index_limit = (distance / tile_width).ceil() as i32;
    let dist_sq = distance * distance;
    let half = tile_width * 0.5;
    let center_flat = Vec2::new(center.x, center.z);
    let nearest = tile_index(center, tile_width);

    for x in (nearest.x - index_limit)..=(nearest.x + index_limit) {
        for y in (nearest.y - index_limit)..=(nearest.y + index_limit) {
            let coords = TileCoords::new(x, y);
            let tile_pos = tile_center(coords, tile_width);
            let planar_sq = Vec2::new(tile_pos.x, tile_pos.z).distance_squared(center_flat);
            if planar_sq - half < dist_sq {
                result.insert(coords);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index_basic() {
        assert_eq!(tile_index(Vec3::new(10.0, 0.0, 10.0), 16.0), TileCoords::new(1, 1));
        assert_eq!(tile_index(Vec3::new(20.0, 0.0, -5.0), 16.0), TileCoords::new(2, 0));
        assert_eq!(tile_index(Vec3::new(-0.5, 0.0, -0.5), 16.0), TileCoords::new(0, 0));
    }

    #[test]
    fn tile_index_ignores_height() {
        let a = tile_index(Vec3::new(10.0, -500.0, 10.0), 16.0);
        let b = tile_index(Vec3::new(10.0, 500.0, 10.0), 16.0);
        assert_eq!(a, b);
    }

    #[test]
    fn tile_center_inverse_of_index() {
        // Round-trip property: the cell found for a position must contain it.
        let width = 256.0;
        for pos in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(130.0, 12.0, -70.0),
            Vec3::new(-512.0, 0.0, 511.9),
            Vec3::new(1e5, -3.0, -1e5),
        ] {
            let coords = tile_index(pos, width);
            let center = tile_center(coords, width);
            assert!((pos.x - center.x).abs() <= width * 0.5 + 1e-2, "x for {pos:?}");
            assert!((pos.z - center.z).abs() <= width * 0.5 + 1e-2, "z for {pos:?}");
        }
    }

    #[test]
    fn tile_bounds_vertically_unbounded() {
        let bounds = tile_bounds(TileCoords::new(0, 0), 32.0);
        assert_eq!(bounds.extents.x, 16.0);
        assert_eq!(bounds.extents.z, 16.0);
        assert!(bounds.extents.y >= TILE_VERTICAL_EXTENT);
    }

    #[test]
    fn distance_range_inside_bounds_min_is_zero() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        let (min, max) = distance_range_sq(&bounds, Vec3::new(1.0, 0.0, 1.0), &Mat4::IDENTITY);
        assert_eq!(min, 0.0);
        assert!(max > 0.0);
    }

    #[test]
    fn distance_range_respects_transform() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let shifted = Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0));
        let (min, _) = distance_range_sq(&bounds, Vec3::ZERO, &shifted);
        // Nearest face sits at x = 99.
        assert!((min - 99.0 * 99.0).abs() < 1e-2);
    }

    #[test]
    fn tiles_within_distance_includes_center_cell() {
        let center = Vec3::new(5.0, 0.0, 5.0);
        let coords = tiles_within_distance(center, 100.0, 64.0);
        assert!(coords.contains(&tile_index(center, 64.0)));
        assert!(!coords.is_empty());
    }

    #[test]
    fn tiles_within_distance_excludes_far_cells() {
        let coords = tiles_within_distance(Vec3::ZERO, 100.0, 64.0);
        assert!(!coords.contains(&TileCoords::new(50, 50)));
    }

    #[test]
    fn tiles_within_zero_distance_is_empty() {
        assert!(tiles_within_distance(Vec3::ZERO, 0.0, 64.0).is_empty());
    }
}
