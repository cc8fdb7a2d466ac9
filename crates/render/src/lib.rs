//! Renderer-facing side of a scatter stream.
//!
//! The core streaming and editing code never draws; this crate turns tile
//! contents into things a backend can consume: LOD-band sorted buffers
//! published through a tear-free slot for instanced drawing, or mirrored
//! per-instance entities through the [`EntitySink`] variant of the instance
//! sink. Frustum culling of tiles uses the stream-local frustum the
//! streamer maintains each tick.

mod lod;
mod sink;
mod slot;
mod sorter;

pub use lod::{RenderBuffer, TileRenderData, keep_instance, sort_snapshot, sort_tile};
pub use sink::{EntitySink, EntitySpawner};
pub use slot::RenderSlot;
pub use sorter::LodSorter;

pub fn crate_info() -> &'static str {
    "scatterspace-render v0.1.0"
}
