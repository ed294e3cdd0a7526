#![warn(missing_docs)]

//! Ray/triangle intersection kernels for the isect engine.
//!
//! This crate holds the backend-independent algorithms: mesh validation and
//! triangulation, ray/box and ray/triangle tests, and the bounding volume
//! hierarchy used to answer closest-hit and any-hit queries in sub-linear
//! time.
//!
//! # Architecture
//!
//! - [`Ray`] - Ray with origin, unnormalised direction and accepted `t` range
//! - [`Triangle`] - Triangle primitive with Möller–Trumbore intersection
//! - [`mesh`] - Strided vertex gathering and fan triangulation
//! - [`bvh`] - Bounding volume hierarchy for acceleration
//!
//! # Example
//!
//! ```
//! use isect_kernel::{Bvh, BuildSettings, Ray, Triangle};
//! use isect_math::{Point3, Vec3};
//!
//! let tris = vec![Triangle::new(
//!     Point3::new(-1.0, -1.0, 0.0),
//!     Point3::new(1.0, -1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! )];
//! let bounds: Vec<_> = tris.iter().map(Triangle::aabb).collect();
//! let bvh = Bvh::build(&bounds, &BuildSettings::default());
//!
//! let ray = Ray::new(Point3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 10.0));
//! let hit = bvh.closest_hit(&ray, |i| tris[i as usize].intersect(&ray));
//! assert!(hit.is_some());
//! ```

pub mod bvh;
pub mod error;
pub mod mesh;
mod ray;
mod triangle;

pub use bvh::{BuildSettings, Bvh, FlatBvhNode, HitDistance, SplitStrategy};
pub use error::MeshError;
pub use ray::Ray;
pub use triangle::{Triangle, TriangleHit};
