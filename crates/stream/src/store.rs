//! In-memory bookkeeping for one stream's resident tiles.
//!
//! The store is a plain map plus three coordinate sets; it performs no
//! algorithmic work of its own. All mutation happens under the stream's
//! store mutex.
//!
//! # Invariants
//! - A coordinate is in exactly one of: not present, present in `tiles`, or
//!   in `being_streamed_in`.
//! - Dirtiness is tracked in the `dirty` set, never on the tile, so flush
//!   sweeps are a set drain.
//! - `attempted_missing` entries are pruned once out of range so a
//!   reappearing cache file is retried.

use glam::Vec3;
use scatterspace_common::{Aabb, PresetCatalogue, TileCoords, Transform, grid};
use std::collections::{HashMap, HashSet};

/// One resident tile: per-preset instance lists in stream-local space plus
/// cached render bounds.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coords: TileCoords,
    /// Outer index: preset index in the stream's catalogue.
    pub instances: Vec<Vec<Transform>>,
    pub render_bounds: Aabb,
}

impl Tile {
    pub fn new(coords: TileCoords, preset_count: usize, tile_width: f32) -> Self {
        let mut instances = Vec::with_capacity(preset_count);
        instances.resize_with(preset_count, Vec::new);
        Self {
            coords,
            instances,
            render_bounds: grid::tile_bounds(coords, tile_width),
        }
    }

    /// Grow or truncate the per-preset lists to match the catalogue.
    /// Indexing is only ever done after this, so a stale preset count
    /// degrades to a no-op growth instead of a panic.
    pub fn ensure_preset_count(&mut self, preset_count: usize) {
        if self.instances.len() != preset_count {
            self.instances.resize_with(preset_count, Vec::new);
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.iter().all(Vec::is_empty)
    }

    /// Rebuild render bounds from current instances, padding each position
    /// by the preset's bounding radius at the instance's largest scale axis.
    /// An empty tile falls back to its grid cell bounds.
    pub fn recompute_bounds(&mut self, presets: &PresetCatalogue, tile_width: f32) {
        let mut bounds: Option<Aabb> = None;

        for (preset_index, instances) in self.instances.iter().enumerate() {
            let radius = presets
                .get(preset_index)
                .map(|p| p.bounding_radius)
                .unwrap_or(1.0);

            for instance in instances {
                let pad = Vec3::splat(radius * instance.scale.max_element().max(0.0));
                let lo = instance.position - pad;
                let hi = instance.position + pad;
                match &mut bounds {
                    None => {
                        let mut b = Aabb::at_point(lo);
                        b.encapsulate(hi);
                        bounds = Some(b);
                    }
                    Some(b) => {
                        b.encapsulate(lo);
                        b.encapsulate(hi);
                    }
                }
            }
        }

        self.render_bounds = bounds.unwrap_or_else(|| grid::tile_bounds(self.coords, tile_width));
    }
}

/// Map of loaded tiles plus the dirty / mid-load / known-missing sets.
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: HashMap<TileCoords, Tile>,
    dirty: HashSet<TileCoords>,
    being_streamed_in: HashSet<TileCoords>,
    attempted_missing: HashSet<TileCoords>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coords: TileCoords) -> Option<&Tile> {
        self.tiles.get(&coords)
    }

    pub fn get_mut(&mut self, coords: TileCoords) -> Option<&mut Tile> {
        self.tiles.get_mut(&coords)
    }

    pub fn contains(&self, coords: TileCoords) -> bool {
        self.tiles.contains_key(&coords)
    }

    pub fn insert_tile(&mut self, tile: Tile) {
        self.tiles.insert(tile.coords, tile);
    }

    pub fn remove_tile(&mut self, coords: TileCoords) -> Option<Tile> {
        self.dirty.remove(&coords);
        self.tiles.remove(&coords)
    }

    /// Existing tile at `coords`, or a fresh empty one sized to the current
    /// preset count.
    pub fn get_or_create(
        &mut self,
        coords: TileCoords,
        preset_count: usize,
        tile_width: f32,
    ) -> &mut Tile {
        self.tiles
            .entry(coords)
            .or_insert_with(|| Tile::new(coords, preset_count, tile_width))
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn loaded_coords(&self) -> Vec<TileCoords> {
        self.tiles.keys().copied().collect()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    // Dirty set

    pub fn mark_dirty(&mut self, coords: TileCoords) {
        self.dirty.insert(coords);
    }

    pub fn clear_dirty(&mut self, coords: TileCoords) {
        self.dirty.remove(&coords);
    }

    pub fn is_dirty(&self, coords: TileCoords) -> bool {
        self.dirty.contains(&coords)
    }

    pub fn dirty_coords(&self) -> Vec<TileCoords> {
        self.dirty.iter().copied().collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    // Mid-load set

    pub fn begin_stream_in(&mut self, coords: TileCoords) {
        self.being_streamed_in.insert(coords);
    }

    pub fn finish_stream_in(&mut self, coords: TileCoords) {
        self.being_streamed_in.remove(&coords);
    }

    pub fn is_streaming_in(&self, coords: TileCoords) -> bool {
        self.being_streamed_in.contains(&coords)
    }

    pub fn streaming_in_count(&self) -> usize {
        self.being_streamed_in.len()
    }

    // Attempted-but-missing set

    pub fn mark_missing(&mut self, coords: TileCoords) {
        self.attempted_missing.insert(coords);
    }

    pub fn clear_missing(&mut self, coords: TileCoords) {
        self.attempted_missing.remove(&coords);
    }

    pub fn is_missing(&self, coords: TileCoords) -> bool {
        self.attempted_missing.contains(&coords)
    }

    /// Drop missing-markers for coordinates no longer in range, so a later
    /// reappearance re-attempts the load.
    pub fn prune_missing(&mut self, in_range: &HashSet<TileCoords>) {
        self.attempted_missing.retain(|c| in_range.contains(c));
    }

    pub fn missing_count(&self) -> usize {
        self.attempted_missing.len()
    }
}
