//! Ray representation and the ray/box slab test.

use isect_math::{Aabb3, Point3, Vec3};

/// A ray in 3D space with a parametric validity range.
///
/// The direction is kept as given (not normalised), so `t` is measured in
/// multiples of `direction`.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Point3,
    /// Direction of the ray.
    pub direction: Vec3,
    /// Smallest accepted hit parameter.
    pub t_min: f32,
    /// Largest accepted hit parameter.
    pub t_max: f32,
    /// Precomputed reciprocal of direction components for fast AABB tests.
    inv_direction: Vec3,
    /// Sign of direction components (0 if positive, 1 if negative).
    sign: [usize; 3],
}

impl Ray {
    /// Create a new ray accepting hits in `[0, inf)`.
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        Self::with_range(origin, direction, 0.0, f32::INFINITY)
    }

    /// Create a new ray accepting hits in `[t_min, t_max]`.
    pub fn with_range(origin: Point3, direction: Vec3, t_min: f32, t_max: f32) -> Self {
        let inv = Vec3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        let sign = [
            if inv.x < 0.0 { 1 } else { 0 },
            if inv.y < 0.0 { 1 } else { 0 },
            if inv.z < 0.0 { 1 } else { 0 },
        ];
        Self {
            origin,
            direction,
            t_min,
            t_max,
            inv_direction: inv,
            sign,
        }
    }

    /// True if `t` lies inside the ray's accepted range.
    #[inline]
    pub fn accepts(&self, t: f32) -> bool {
        t >= self.t_min && t <= self.t_max
    }

    /// Test ray-AABB intersection using the slab method.
    ///
    /// Returns `Some((t_enter, t_exit))` clipped to the ray's range, or
    /// `None` if the box is missed or lies entirely outside the range.
    ///
    /// Zero direction components produce infinite reciprocals; the
    /// NaN-ignoring `min`/`max` keep the test stable for axis-aligned rays.
    #[inline]
    pub fn intersect_aabb(&self, aabb: &Aabb3) -> Option<(f32, f32)> {
        let bounds = [aabb.min, aabb.max];

        let tx1 = (bounds[self.sign[0]].x - self.origin.x) * self.inv_direction.x;
        let tx2 = (bounds[1 - self.sign[0]].x - self.origin.x) * self.inv_direction.x;

        let mut t_min = tx1;
        let mut t_max = tx2;

        let ty1 = (bounds[self.sign[1]].y - self.origin.y) * self.inv_direction.y;
        let ty2 = (bounds[1 - self.sign[1]].y - self.origin.y) * self.inv_direction.y;

        t_min = t_min.max(ty1);
        t_max = t_max.min(ty2);

        let tz1 = (bounds[self.sign[2]].z - self.origin.z) * self.inv_direction.z;
        let tz2 = (bounds[1 - self.sign[2]].z - self.origin.z) * self.inv_direction.z;

        t_min = t_min.max(tz1).max(self.t_min);
        t_max = t_max.min(tz2).min(self.t_max);

        if t_max >= t_min {
            Some((t_min, t_max))
        } else {
            None
        }
    }
}
