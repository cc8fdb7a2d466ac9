//! The surface-query collaborator.
//!
//! Placement needs to know where candidate points land on the scene's
//! geometry; that lives outside this crate. Implementations answer ray casts
//! with a hit position, normal, and a surface name usable by the brush's
//! name filters.

use glam::Vec3;

/// One ray-cast hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceHit {
    pub position: Vec3,
    pub normal: Vec3,
    /// Name of the surface object, matched against brush filters.
    pub surface_name: String,
}

/// External physics/scene query. Returns the closest hit along the ray, or
/// `None` when the ray escapes the scene.
pub trait SurfaceQuery: Send + Sync {
    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<SurfaceHit>;
}

/// Infinite horizontal plane at a fixed height. Enough surface for the CLI
/// demo and the brush tests.
#[derive(Debug, Clone)]
pub struct FlatSurface {
    pub height: f32,
    pub name: String,
}

impl FlatSurface {
    pub fn new(height: f32, name: impl Into<String>) -> Self {
        Self {
            height,
            name: name.into(),
        }
    }
}

impl SurfaceQuery for FlatSurface {
    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<SurfaceHit> {
        if direction.y.abs() < 1e-6 {
            return None;
        }
        let t = (self.height - origin.y) / direction.y;
        if t <= 0.0 {
            return None;
        }
        Some(SurfaceHit {
            position: origin + direction * t,
            normal: Vec3::Y,
            surface_name: self.name.clone(),
        })
    }
}
