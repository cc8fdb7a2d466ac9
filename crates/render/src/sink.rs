//! Live-entity instance sink.
//!
//! The alternative backend to instanced drawing: every placed instance gets
//! a spawned entity in the host scene. The sink mirrors tile mutations into
//! spawn/despawn calls against an [`EntitySpawner`] supplied by the engine
//! side, and re-derives world transforms when the stream's parent moves.

use glam::Mat4;
use scatterspace_common::{InstanceSink, TileCoords, Transform};
use std::collections::HashMap;

/// Engine-side entity factory the sink drives.
pub trait EntitySpawner: Send {
    type Handle: Copy + Send;

    fn spawn(&mut self, preset_index: usize, world: &Transform) -> Self::Handle;
    fn despawn(&mut self, handle: Self::Handle);
    fn transform_changed(&mut self, handle: Self::Handle, world: &Transform);
}

/// Mirrors a stream's instances into one spawned entity each.
pub struct EntitySink<S: EntitySpawner> {
    spawner: S,
    local_to_world: Mat4,
    /// Per tile, per preset: spawned handle plus the stream-local transform
    /// it was derived from.
    tiles: HashMap<TileCoords, Vec<Vec<(S::Handle, Transform)>>>,
}

impl<S: EntitySpawner> EntitySink<S> {
    pub fn new(spawner: S, local_to_world: Mat4) -> Self {
        Self {
            spawner,
            local_to_world,
            tiles: HashMap::new(),
        }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn entity_count(&self) -> usize {
        self.tiles
            .values()
            .flat_map(|presets| presets.iter())
            .map(Vec::len)
            .sum()
    }
}

impl<S: EntitySpawner> InstanceSink for EntitySink<S> {
    fn append(
        &mut self,
        coords: TileCoords,
        preset_index: usize,
        local_to_stream: &Transform,
        world: &Transform,
    ) {
        let presets = self.tiles.entry(coords).or_default();
        if presets.len() <= preset_index {
            presets.resize_with(preset_index + 1, Vec::new);
        }
        let handle = self.spawner.spawn(preset_index, world);
        presets[preset_index].push((handle, *local_to_stream));
    }

    fn remove(&mut self, coords: TileCoords, preset_index: usize, instance_index: usize) {
        let Some(presets) = self.tiles.get_mut(&coords) else {
            return;
        };
        let Some(list) = presets.get_mut(preset_index) else {
            return;
        };
        if instance_index < list.len() {
            let (handle, _) = list.remove(instance_index);
            self.spawner.despawn(handle);
        }
    }

    fn clear_tile(&mut self, coords: TileCoords) {
        let Some(presets) = self.tiles.remove(&coords) else {
            return;
        };
        for (handle, _) in presets.into_iter().flatten() {
            self.spawner.despawn(handle);
        }
    }

    fn stream_transform_changed(&mut self, local_to_world: &Mat4) {
        self.local_to_world = *local_to_world;
        for presets in self.tiles.values() {
            for (handle, local) in presets.iter().flatten() {
                let world = local.transformed_by(local_to_world);
                self.spawner.transform_changed(*handle, &world);
            }
        }
    }
}
