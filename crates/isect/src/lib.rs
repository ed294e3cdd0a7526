#![warn(missing_docs)]

//! Batched ray/scene intersection.
//!
//! `isect` ingests triangle and polygon meshes, builds a bounding volume
//! hierarchy over the attached set on [`IntersectionApi::commit`], and answers
//! closest-hit and occlusion queries for whole batches of rays read from and
//! written to byte buffers.
//!
//! # Architecture
//!
//! - [`IntersectionApi`] - One engine instance bound to a device
//! - [`MeshDesc`] - Borrowed mesh input (strided vertices, polygon faces)
//! - [`RayRecord`], [`HitRecord`] - Fixed-layout records stored in buffers
//! - [`Mapping`] - Host view of a mapped buffer range
//! - [`Backend`] - Device abstraction; [`CpuBackend`] runs on a rayon pool
//! - [`Config`] - Builder, traversal and resource settings (TOML)
//!
//! Queries run asynchronously on a per-instance queue in submission order.
//! Each query captures the committed scene it was issued against, so later
//! edits and commits never change its results.
//!
//! # Example
//!
//! ```
//! use isect::{Completion, Config, HitRecord, IntersectionApi, MapMode, MeshDesc, RayRecord};
//!
//! let mut api = IntersectionApi::create(0, Config::default())?;
//!
//! let vertices = [-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0];
//! let shape = api.create_mesh(&MeshDesc::triangles(&vertices, &[0, 1, 2]))?;
//! api.attach_shape(shape)?;
//! api.commit()?;
//!
//! let rays = api.create_buffer_from(&[RayRecord::new([0.0, 0.0, -1.0], [0.0, 0.0, 10.0], 1000.0)])?;
//! let hits = api.create_buffer(isect::HIT_SIZE, None)?;
//! api.query_intersection(rays, 1, hits, None, Completion::Blocking)?;
//!
//! let (mapping, ready) = api.map_buffer(hits, MapMode::Read, 0, isect::HIT_SIZE)?;
//! api.wait_event(ready)?;
//! let hit: Vec<HitRecord> = mapping.read_records()?;
//! assert_eq!(hit[0].shape_id, api.shape_id(shape)?);
//! assert!((hit[0].t() - 0.1).abs() < 1e-6);
//! api.unmap_buffer(mapping)?;
//! # Ok::<(), isect::Error>(())
//! ```

mod api;
pub mod backend;
mod buffer;
pub mod config;
pub mod device;
pub mod error;
mod event;
mod handle;
mod query;
mod queue;
pub mod records;
pub mod scene;
mod shape;

pub use api::{Completion, IntersectionApi};
pub use backend::{Backend, CpuBackend};
pub use buffer::{MapMode, Mapping};
pub use config::{BuilderKind, Config, StalePolicy};
pub use device::{DeviceInfo, DeviceKind};
pub use error::{Error, Result};
pub use event::EventStatus;
pub use handle::{BufferHandle, EventHandle, ShapeHandle};
pub use query::QueryKind;
pub use records::{HitRecord, RayRecord, HIT_SIZE, NULL_ID, OCCLUSION_SIZE, RAY_SIZE};
pub use scene::SceneStats;
pub use shape::MeshDesc;

pub use isect_kernel::MeshError;
