#![warn(missing_docs)]

//! Math types for the isect intersection engine.
//!
//! Thin wrappers around nalgebra in single precision, matching the
//! `f32` layout of the ray and hit records that cross the buffer layer,
//! plus the axis-aligned box used by the acceleration structure.

use nalgebra::Vector3;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f32>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f32>;

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// True if nothing has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand this AABB to include another box.
    pub fn include_aabb(&mut self, other: &Aabb3) {
        if other.is_empty() {
            return;
        }
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths along x, y, z.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::zeros();
        }
        self.max - self.min
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Surface area, zero for an empty box.
    pub fn surface_area(&self) -> f32 {
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

/// Component of a point along an axis index.
#[inline]
pub fn axis_of(p: &Point3, axis: usize) -> f32 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

/// Tolerance constants for geometric comparisons.
///
/// Both thresholds are relative to the size of the geometry involved, so a
/// tiny but well-shaped triangle is treated the same as a large one.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Ray-triangle determinant, relative to `|d| |e1| |e2|`, below which the
    /// ray is treated as parallel to the triangle.
    pub parallel: f32,
    /// Triangle area, relative to the squared longest edge, below which the
    /// triangle is degenerate.
    pub area: f32,
}

impl Tolerance {
    /// Default single-precision tolerances.
    pub const DEFAULT: Self = Self {
        parallel: 1e-7,
        area: 1e-7,
    };

    /// Check if a triangle with the given area and squared longest edge is
    /// effectively flat.
    pub fn is_degenerate_area(&self, area: f32, longest_edge_sq: f32) -> bool {
        area.is_nan() || area <= self.area * longest_edge_sq
    }

    /// Check if a determinant is negligible against the product of the
    /// lengths it was built from.
    pub fn is_parallel(&self, det: f32, scale: f32) -> bool {
        !det.is_finite() || det.abs() <= self.parallel * scale
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}
