//! Committed scene snapshots.
//!
//! A snapshot is immutable once built. Queries hold it through an `Arc`, so
//! edits and recommits never disturb work already queued against it.

use isect_kernel::{BuildSettings, Bvh, Ray, Triangle};
use isect_math::{Aabb3, Point3, Tolerance, Vec3};

use crate::error::{Error, Result};
use crate::records::{HitRecord, RayRecord};

/// Identity and filter bits carried by each scene triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimTag {
    /// Id of the owning shape.
    pub shape_id: i32,
    /// Face index within the shape.
    pub face: u32,
    /// Fan triangle index within the face.
    pub fan: u32,
    /// Visibility mask of the owning shape.
    pub mask: u32,
}

/// One triangle entering a scene build.
#[derive(Debug, Clone, Copy)]
pub struct ScenePrimitive {
    /// World-space triangle.
    pub triangle: Triangle,
    /// Identity reported on hits.
    pub tag: PrimTag,
}

/// Summary of a committed scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStats {
    /// Triangles in the acceleration structure.
    pub triangles: usize,
    /// Degenerate triangles left out.
    pub excluded: usize,
    /// BVH nodes.
    pub nodes: usize,
    /// BVH depth.
    pub depth: usize,
}

/// Immutable acceleration structure over the attached geometry.
#[derive(Debug)]
pub struct SceneSnapshot {
    revision: u64,
    triangles: Vec<Triangle>,
    tags: Vec<PrimTag>,
    bvh: Bvh,
    excluded: usize,
}

impl SceneSnapshot {
    /// Build a snapshot of `prims` taken at geometry `revision`.
    ///
    /// Primitives are ordered by shape id, face and fan index before the
    /// build, so hits at equal distance resolve to the lowest of those.
    /// Degenerate triangles are dropped.
    pub fn build(
        mut prims: Vec<ScenePrimitive>,
        revision: u64,
        settings: &BuildSettings,
    ) -> Result<Self> {
        prims.sort_by_key(|p| (p.tag.shape_id, p.tag.face, p.tag.fan));

        let total = prims.len();
        let tol = Tolerance::DEFAULT;
        prims.retain(|p| {
            let degenerate = p.triangle.is_degenerate(&tol);
            if degenerate {
                log::debug!(
                    "excluding degenerate triangle: shape {} face {} fan {}",
                    p.tag.shape_id,
                    p.tag.face,
                    p.tag.fan
                );
            }
            !degenerate
        });
        let excluded = total - prims.len();
        if excluded > 0 {
            log::warn!("excluded {excluded} degenerate triangles from the scene");
        }

        let mut triangles = Vec::new();
        triangles
            .try_reserve_exact(prims.len())
            .map_err(|_| Error::OutOfMemory {
                requested: prims.len() * std::mem::size_of::<Triangle>(),
            })?;
        let mut tags = Vec::new();
        tags.try_reserve_exact(prims.len())
            .map_err(|_| Error::OutOfMemory {
                requested: prims.len() * std::mem::size_of::<PrimTag>(),
            })?;
        for prim in prims {
            triangles.push(prim.triangle);
            tags.push(prim.tag);
        }

        let bounds: Vec<Aabb3> = triangles.iter().map(Triangle::aabb).collect();
        let bvh = Bvh::build(&bounds, settings);

        Ok(Self {
            revision,
            triangles,
            tags,
            bvh,
            excluded,
        })
    }

    /// Geometry revision this snapshot was built from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Size summary.
    pub fn stats(&self) -> SceneStats {
        SceneStats {
            triangles: self.triangles.len(),
            excluded: self.excluded,
            nodes: self.bvh.node_count(),
            depth: self.bvh.depth(),
        }
    }

    fn kernel_ray(record: &RayRecord, t_min: f32) -> Ray {
        let [ox, oy, oz, max_t] = record.origin;
        let [dx, dy, dz, _] = record.direction;
        Ray::with_range(Point3::new(ox, oy, oz), Vec3::new(dx, dy, dz), t_min, max_t)
    }

    /// Nearest hit of one ray, or [`HitRecord::MISS`].
    pub fn closest_hit(&self, record: &RayRecord, t_min: f32) -> HitRecord {
        if !record.is_active() {
            return HitRecord::MISS;
        }
        let ray = Self::kernel_ray(record, t_min);
        let mask = record.mask();

        self.bvh
            .closest_hit(&ray, |i| {
                let i = i as usize;
                if self.tags[i].mask & mask == 0 {
                    return None;
                }
                self.triangles[i].intersect(&ray)
            })
            .map_or(HitRecord::MISS, |(i, hit)| {
                let tag = &self.tags[i as usize];
                HitRecord::hit(tag.shape_id, tag.face as i32, hit.u, hit.v, hit.t)
            })
    }

    /// True if anything blocks the ray within its range.
    pub fn occluded(&self, record: &RayRecord, t_min: f32) -> bool {
        if !record.is_active() {
            return false;
        }
        let ray = Self::kernel_ray(record, t_min);
        let mask = record.mask();

        self.bvh.any_hit(&ray, |i| {
            let i = i as usize;
            if self.tags[i].mask & mask == 0 {
                return None;
            }
            self.triangles[i].intersect(&ray)
        })
    }
}
