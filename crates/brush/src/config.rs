//! Brush configuration and name-based surface filters.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// How a filter's key is compared against a surface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMethod {
    Contains,
    DoesNotContain,
    ExactMatch,
}

/// One entry in the brush's filter stack. All filters must pass for a
/// candidate point to survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceFilter {
    pub method: FilterMethod,
    pub key: String,
    pub case_sensitive: bool,
}

impl SurfaceFilter {
    pub fn new(method: FilterMethod, key: impl Into<String>) -> Self {
        Self {
            method,
            key: key.into(),
            case_sensitive: false,
        }
    }

    pub fn matches(&self, surface_name: &str) -> bool {
        let (name, key) = if self.case_sensitive {
            (surface_name.to_string(), self.key.clone())
        } else {
            (surface_name.to_lowercase(), self.key.to_lowercase())
        };

        match self.method {
            FilterMethod::Contains => name.contains(&key),
            FilterMethod::DoesNotContain => !name.contains(&key),
            FilterMethod::ExactMatch => name == key,
        }
    }
}

/// When queued strokes are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokeProcessing {
    /// Each stroke is applied as soon as the processor reaches it.
    #[default]
    Immediate,
    /// Strokes accumulate while the input button is held and drain together
    /// on release. Fewer redundant sort/save passes during a drag, at the
    /// cost of per-stroke responsiveness.
    DeferredToEndOfStroke,
}

/// Tunables for one brush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushConfig {
    /// Distance between candidate points in the placement lattice.
    pub spacing: f32,
    pub diameter: f32,
    /// Min/max of the noise-driven per-instance scale factor.
    pub scale_range: Vec2,
    pub noise_scale: f32,
    /// Normalised strength of positional noise offset as a factor of spacing.
    pub position_noise_strength: f32,
    pub randomise_yaw: bool,
    /// Align placed instances to the hit surface normal.
    pub conform_to_surface: bool,
    /// How close to a forbidden surface items may be placed.
    pub filter_padding: f32,
    /// Number of auxiliary rays in the filter padding ring.
    pub filter_precision: usize,
    pub filters: Vec<SurfaceFilter>,
    pub stroke_processing: StrokeProcessing,
    /// Consecutive strokes processed before the brush yields to a dirty-tile
    /// flush.
    pub max_deferred_strokes_before_flush: usize,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            spacing: 0.75,
            diameter: 50.0,
            scale_range: Vec2::new(0.5, 1.5),
            noise_scale: 2.0,
            position_noise_strength: 0.0,
            randomise_yaw: true,
            conform_to_surface: false,
            filter_padding: 0.0,
            filter_precision: 4,
            filters: Vec::new(),
            stroke_processing: StrokeProcessing::Immediate,
            max_deferred_strokes_before_flush: 3,
        }
    }
}
