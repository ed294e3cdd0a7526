//! Triangle primitive and ray-triangle intersection (Möller–Trumbore).

use isect_math::{Aabb3, Point3, Tolerance};

use crate::Ray;

/// A triangle with its three vertex positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Vertex positions.
    pub v: [Point3; 3],
}

/// Result of a ray-triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Parameter along the ray.
    pub t: f32,
    /// Barycentric weight of `v[1]`.
    pub u: f32,
    /// Barycentric weight of `v[2]`.
    pub v: f32,
}

impl Triangle {
    /// Create a new triangle from vertices.
    pub fn new(v0: Point3, v1: Point3, v2: Point3) -> Self {
        Self { v: [v0, v1, v2] }
    }

    /// Bounding box of the three vertices.
    pub fn aabb(&self) -> Aabb3 {
        let mut aabb = Aabb3::empty();
        for p in &self.v {
            aabb.include_point(p);
        }
        aabb
    }

    /// Triangle area (NaN if any coordinate is not finite).
    pub fn area(&self) -> f32 {
        let e1 = self.v[1] - self.v[0];
        let e2 = self.v[2] - self.v[0];
        0.5 * e1.cross(&e2).norm()
    }

    /// Zero-area or non-finite triangles can never be hit reliably.
    pub fn is_degenerate(&self, tol: &Tolerance) -> bool {
        let finite = self
            .v
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
        !finite || tol.is_degenerate_area(self.area(), self.longest_edge_sq())
    }

    fn longest_edge_sq(&self) -> f32 {
        let [a, b, c] = self.v;
        (b - a)
            .norm_squared()
            .max((c - b).norm_squared())
            .max((a - c).norm_squared())
    }

    /// Intersect a ray with this triangle.
    ///
    /// Two-sided. The returned `t` is not checked against the ray's range;
    /// callers decide whether it is acceptable.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<TriangleHit> {
        let e1 = self.v[1] - self.v[0];
        let e2 = self.v[2] - self.v[0];

        let p = ray.direction.cross(&e2);
        let det = e1.dot(&p);
        let scale = ray.direction.norm() * e1.norm() * e2.norm();
        if Tolerance::DEFAULT.is_parallel(det, scale) {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = ray.origin - self.v[0];
        let u = s.dot(&p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&e1);
        let v = ray.direction.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = e2.dot(&q) * inv_det;
        if !t.is_finite() {
            return None;
        }

        Some(TriangleHit { t, u, v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use isect_math::Vec3;

    fn tutorial_triangle() -> Triangle {
        Triangle::new(
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_hit_unnormalized_direction() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 10.0));
        let hit = tri.intersect(&ray).unwrap();
        assert_relative_eq!(hit.t, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_barycentrics_at_centroid() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(0.0, -1.0 / 3.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        let hit = tri.intersect(&ray).unwrap();
        let w = 1.0 - hit.u - hit.v;
        assert_relative_eq!(hit.u, 1.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(hit.v, 1.0 / 3.0, epsilon = 1e-5);
        assert_relative_eq!(hit.u + hit.v + w, 1.0, epsilon = 1e-6);
        assert_relative_eq!(hit.t, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_barycentrics_reconstruct_point() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(0.4, 0.0, -10.0), Vec3::new(0.0, 0.0, 1.0));
        let hit = tri.intersect(&ray).unwrap();
        let p = tri.v[0].coords * (1.0 - hit.u - hit.v) + tri.v[1].coords * hit.u + tri.v[2].coords * hit.v;
        assert_relative_eq!(p.x, 0.4, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_miss_outside() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(5.0, 5.0, -10.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(tri.intersect(&ray).is_none());
    }

    #[test]
    fn test_miss_parallel() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(tri.intersect(&ray).is_none());
    }

    #[test]
    fn test_hit_behind_reports_negative_t() {
        let tri = tutorial_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0));
        let hit = tri.intersect(&ray).unwrap();
        assert!(hit.t < 0.0);
        assert!(!ray.accepts(hit.t));
    }

    #[test]
    fn test_degenerate() {
        let tol = Tolerance::DEFAULT;
        let collinear = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        let nan = Triangle::new(
            Point3::new(f32::NAN, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        assert!(collinear.is_degenerate(&tol));
        assert!(nan.is_degenerate(&tol));
        assert!(!tutorial_triangle().is_degenerate(&tol));
    }

    #[test]
    fn test_small_triangle_is_hittable() {
        let tol = Tolerance::DEFAULT;
        let tiny = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1e-6, 0.0, 0.0),
            Point3::new(0.0, 1e-6, 0.0),
        );
        assert!(!tiny.is_degenerate(&tol));

        let ray = Ray::new(Point3::new(2.5e-7, 2.5e-7, -1.0), Vec3::new(0.0, 0.0, 1.0));
        let hit = tiny.intersect(&ray).unwrap();
        assert_relative_eq!(hit.t, 1.0, epsilon = 1e-5);
    }
}
