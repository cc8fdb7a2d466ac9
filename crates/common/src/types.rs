use glam::{Mat4, Quat, Vec2, Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};

/// Coordinates of one square tile in a stream's grid (ground plane only;
/// the vertical axis plays no part in tile addressing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoords {
    pub x: i32,
    pub y: i32,
}

impl TileCoords {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for TileCoords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Spatial transform: position, rotation, non-uniform scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Compose this transform with `matrix` applied on the left, e.g. mapping
    /// a stream-local instance into world space.
    pub fn transformed_by(&self, matrix: &Mat4) -> Self {
        Self::from_matrix(&(*matrix * self.to_matrix()))
    }
}

/// Axis-aligned box stored as center + half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Degenerate box containing only `point`.
    pub fn at_point(point: Vec3) -> Self {
        Self {
            center: point,
            extents: Vec3::ZERO,
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// Grow the box so that `point` lies inside it.
    pub fn encapsulate(&mut self, point: Vec3) {
        let min = self.min().min(point);
        let max = self.max().max(point);
        *self = Self::from_min_max(min, max);
    }

    /// Closest point on or inside the box to `point`.
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min(), self.max())
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let min = self.min();
        let max = self.max();
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(max.x, max.y, min.z),
        ]
    }

    /// Axis-aligned box enclosing this box after transformation by `matrix`.
    pub fn transformed_by(&self, matrix: &Mat4) -> Self {
        let mut corners = self.corners().into_iter();
        // corners() always yields eight points.
        let first = matrix.transform_point3(corners.next().unwrap_or(self.center));
        let mut result = Self::at_point(first);
        for corner in corners {
            result.encapsulate(matrix.transform_point3(corner));
        }
        result
    }

    /// Whether a vertical cylinder of `radius` around `center` (ground-plane
    /// disk) overlaps this box, ignoring the vertical axis.
    pub fn overlaps_flat_radius(&self, center: Vec3, radius: f32) -> bool {
        let min = self.min();
        let max = self.max();
        let closest = Vec2::new(
            center.x.clamp(min.x, max.x),
            center.z.clamp(min.z, max.z),
        );
        closest.distance_squared(Vec2::new(center.x, center.z)) <= radius * radius
    }
}

/// Plane in normal/distance form: `normal · p + distance = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Re-express this plane in the source space of `matrix`, where `matrix`
    /// maps points from that space into the plane's space. Used to carry a
    /// world-space frustum plane into stream-local space by passing the
    /// stream's local-to-world matrix.
    pub fn transformed_by(&self, matrix: &Mat4) -> Self {
        let v = matrix.transpose()
            * Vec4::new(self.normal.x, self.normal.y, self.normal.z, self.distance);
        let normal = v.xyz();
        let inv_len = normal.length().recip();
        Self {
            normal: normal * inv_len,
            distance: v.w * inv_len,
        }
    }
}

/// Six-plane view frustum, normals pointing inward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Conservative frustum-vs-box test: the box is rejected only when all
    /// eight corners sit behind one plane.
    pub fn intersects_aabb(&self, bounds: &Aabb) -> bool {
        let corners = bounds.corners();
        for plane in &self.planes {
            if corners.iter().all(|c| plane.signed_distance(*c) < 0.0) {
                return false;
            }
        }
        true
    }

    /// Each plane carried into the source space of `matrix` (see
    /// [`Plane::transformed_by`]).
    pub fn transformed_by(&self, matrix: &Mat4) -> Self {
        Self {
            planes: self.planes.map(|p| p.transformed_by(matrix)),
        }
    }
}

/// Viewer state handed to the tick driver: world-space position plus an
/// optional world-space frustum for the renderer's culling.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub frustum: Option<Frustum>,
}

impl Camera {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            frustum: None,
        }
    }
}
