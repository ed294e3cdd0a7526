//! Fixed-layout ray and hit records exchanged through buffers.
//!
//! Both records are `#[repr(C)]` and `Pod`, so a buffer holding `n` records
//! is exactly `n * size_of::<Record>()` bytes with no hidden padding.

use bytemuck::{Pod, Zeroable};

/// Shape id reported for rays that hit nothing.
pub const NULL_ID: i32 = -1;

/// Size in bytes of one [`RayRecord`].
pub const RAY_SIZE: usize = std::mem::size_of::<RayRecord>();

/// Size in bytes of one [`HitRecord`].
pub const HIT_SIZE: usize = std::mem::size_of::<HitRecord>();

/// Size in bytes of one occlusion result.
pub const OCCLUSION_SIZE: usize = std::mem::size_of::<i32>();

/// Input ray layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RayRecord {
    /// Origin xyz, maximum hit distance in `w`.
    pub origin: [f32; 4],
    /// Direction xyz (not normalised), `w` unused.
    pub direction: [f32; 4],
    /// `[mask, active]`: visibility mask bits and a non-zero active flag.
    pub extra: [i32; 2],
    /// Padding.
    pub padding: [i32; 2],
}

impl RayRecord {
    /// An active ray that sees every shape.
    pub fn new(origin: [f32; 3], direction: [f32; 3], max_t: f32) -> Self {
        Self {
            origin: [origin[0], origin[1], origin[2], max_t],
            direction: [direction[0], direction[1], direction[2], 0.0],
            extra: [-1, 1],
            padding: [0; 2],
        }
    }

    /// Replace the visibility mask.
    pub fn with_mask(mut self, mask: u32) -> Self {
        self.extra[0] = mask as i32;
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.extra[1] = active as i32;
        self
    }

    /// Maximum accepted hit distance.
    pub fn max_t(&self) -> f32 {
        self.origin[3]
    }

    /// Visibility mask bits.
    pub fn mask(&self) -> u32 {
        self.extra[0] as u32
    }

    /// Inactive rays always miss.
    pub fn is_active(&self) -> bool {
        self.extra[1] != 0
    }
}

/// Output intersection layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct HitRecord {
    /// Id of the hit shape, or [`NULL_ID`].
    pub shape_id: i32,
    /// Face index within the shape.
    pub prim_id: i32,
    /// Padding.
    pub padding: [i32; 2],
    /// Barycentric `u`, `v`, unused, hit distance `t`.
    pub uvwt: [f32; 4],
}

impl HitRecord {
    /// Record written for rays that hit nothing.
    pub const MISS: Self = Self {
        shape_id: NULL_ID,
        prim_id: NULL_ID,
        padding: [0; 2],
        uvwt: [0.0; 4],
    };

    /// A hit on `shape_id`/`prim_id`.
    pub fn hit(shape_id: i32, prim_id: i32, u: f32, v: f32, t: f32) -> Self {
        Self {
            shape_id,
            prim_id,
            padding: [0; 2],
            uvwt: [u, v, 0.0, t],
        }
    }

    /// True unless this is a miss.
    pub fn is_hit(&self) -> bool {
        self.shape_id != NULL_ID
    }

    /// Barycentric weight of the second fan vertex.
    pub fn u(&self) -> f32 {
        self.uvwt[0]
    }

    /// Barycentric weight of the third fan vertex.
    pub fn v(&self) -> f32 {
        self.uvwt[1]
    }

    /// Hit distance in multiples of the ray direction.
    pub fn t(&self) -> f32 {
        self.uvwt[3]
    }
}
