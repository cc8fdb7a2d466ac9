//! Brush-based editing of scatter streams.
//!
//! Turns a user stroke (position, normal, diameter, mode, preset) into
//! instance mutations: a deterministic jittered lattice of candidate points,
//! surface resolution through the external [`SurfaceQuery`], name-filter
//! culling, and add/delete/replace application under the stream's store
//! mutex. Strokes are queued and processed off the tick so input stays
//! responsive while placement computation runs.

mod config;
mod placement;
mod stroke;
mod surface;

pub use config::{BrushConfig, FilterMethod, StrokeProcessing, SurfaceFilter};
pub use placement::{PlacementMode, Stroke, placement_transforms};
pub use stroke::{BrushProcessor, SinglePlacement, apply_add, apply_delete};
pub use surface::{FlatSurface, SurfaceHit, SurfaceQuery};

pub fn crate_info() -> &'static str {
    "scatterspace-brush v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("brush"));
    }
}
