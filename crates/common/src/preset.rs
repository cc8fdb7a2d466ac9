//! The preset catalogue: ordered definitions of what a stream can place.
//!
//! A preset describes one placeable item: transform offsets applied at
//! placement time, a coarse bounding radius used when computing tile render
//! bounds, and its ordered list of LOD bands. The visual side of a preset
//! (meshes, materials) belongs to the rendering backend and is not modelled
//! here.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One LOD distance band: instances within `draw_distance` of the camera
/// (and beyond the previous band's distance) land in this band, thinned by
/// `density`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodBand {
    pub draw_distance: f32,
    /// Portion of painted density kept at this band, 0 to 1.
    pub density: f32,
}

impl LodBand {
    pub fn new(draw_distance: f32, density: f32) -> Self {
        Self {
            draw_distance,
            density,
        }
    }
}

/// A placeable item definition. Instances reference a preset by its index in
/// the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPreset {
    pub name: String,
    /// Rotation applied to every placed instance before per-point yaw noise.
    #[serde(default = "Quat::default")]
    pub rotation_offset: Quat,
    /// Base scale multiplied by the brush's noise-driven scale factor.
    #[serde(default = "default_scale_multiplier")]
    pub scale_multiplier: Vec3,
    /// Coarse radius of the item's visual at scale 1, used to pad tile
    /// render bounds.
    #[serde(default = "default_bounding_radius")]
    pub bounding_radius: f32,
    /// Ordered by increasing draw distance; bands form contiguous intervals
    /// `[0, d0), [d0, d1), ...`.
    pub lod_bands: Vec<LodBand>,
}

fn default_scale_multiplier() -> Vec3 {
    Vec3::ONE
}

fn default_bounding_radius() -> f32 {
    1.0
}

impl ScatterPreset {
    pub fn new(name: impl Into<String>, lod_bands: Vec<LodBand>) -> Self {
        Self {
            name: name.into(),
            rotation_offset: Quat::IDENTITY,
            scale_multiplier: Vec3::ONE,
            bounding_radius: default_bounding_radius(),
            lod_bands,
        }
    }

    pub fn farthest_draw_distance(&self) -> f32 {
        self.lod_bands
            .last()
            .map(|band| band.draw_distance)
            .unwrap_or(0.0)
    }
}

/// Ordered list of presets for one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetCatalogue {
    pub presets: Vec<ScatterPreset>,
}

impl PresetCatalogue {
    pub fn new(presets: Vec<ScatterPreset>) -> Self {
        Self { presets }
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ScatterPreset> {
        self.presets.get(index)
    }

    /// Largest draw distance across all presets; drives the streaming radius.
    pub fn farthest_draw_distance(&self) -> f32 {
        self.presets
            .iter()
            .map(ScatterPreset::farthest_draw_distance)
            .fold(0.0_f32, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_band_preset(name: &str, far: f32) -> ScatterPreset {
        ScatterPreset::new(
            name,
            vec![LodBand::new(far * 0.25, 1.0), LodBand::new(far, 0.5)],
        )
    }

    #[test]
    fn farthest_distance_across_presets() {
        let catalogue = PresetCatalogue::new(vec![
            two_band_preset("fern", 100.0),
            two_band_preset("pine", 400.0),
            ScatterPreset::new("bare", vec![]),
        ]);
        assert_eq!(catalogue.farthest_draw_distance(), 400.0);
    }

    #[test]
    fn empty_catalogue_distance_is_zero() {
        assert_eq!(PresetCatalogue::default().farthest_draw_distance(), 0.0);
    }

    #[test]
    fn preset_json_round_trip() {
        let catalogue = PresetCatalogue::new(vec![two_band_preset("rock", 200.0)]);
        let text = serde_json::to_string(&catalogue).unwrap();
        let back: PresetCatalogue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, catalogue);
    }
}
