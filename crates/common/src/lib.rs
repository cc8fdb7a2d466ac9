//! Shared types for the scatterspace engine.
//!
//! Everything here is pure data and pure math: tile coordinates, transforms,
//! bounds, the placement grid, and the preset catalogue. No I/O, no
//! threading; those live in the crates that build on this one.

pub mod grid;
pub mod preset;
pub mod sink;
mod types;

pub use preset::{LodBand, PresetCatalogue, ScatterPreset};
pub use sink::{InstanceSink, NoopSink};
pub use types::{Aabb, Camera, Frustum, Plane, TileCoords, Transform};

pub fn crate_info() -> &'static str {
    "scatterspace-common v0.1.0"
}
