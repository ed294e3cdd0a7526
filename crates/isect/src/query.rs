//! Ray batch jobs executed on the device queue.

use std::sync::Arc;

use crate::backend::Backend;
use crate::buffer::{read_storage, write_storage, InFlight, Storage};
use crate::records::{HitRecord, RayRecord, HIT_SIZE, OCCLUSION_SIZE, RAY_SIZE};
use crate::scene::SceneSnapshot;

/// Kind of ray query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Closest hit, one [`HitRecord`] per ray.
    Intersection,
    /// Any hit, one `i32` per ray.
    Occlusion,
}

impl QueryKind {
    /// Bytes written per ray.
    pub fn output_size(self) -> usize {
        match self {
            Self::Intersection => HIT_SIZE,
            Self::Occlusion => OCCLUSION_SIZE,
        }
    }
}

/// Everything a queued query needs, captured at submission.
///
/// The in-flight guards keep the referenced buffers busy until the job is
/// dropped.
pub(crate) struct QueryJob {
    pub kind: QueryKind,
    pub scene: Arc<SceneSnapshot>,
    pub rays: Storage,
    pub output: Storage,
    pub enabled: Option<Storage>,
    pub ray_count: usize,
    pub t_min: f32,
    pub _guards: Vec<InFlight>,
}

impl QueryJob {
    /// Read rays, trace them, write results.
    pub(crate) fn run(&self, backend: &dyn Backend) {
        let count = self.ray_count;
        if count == 0 {
            return;
        }

        let rays: Vec<RayRecord> =
            bytemuck::pod_collect_to_vec(&read_storage(&self.rays)[..count * RAY_SIZE]);
        let enabled: Option<Vec<i32>> = self
            .enabled
            .as_ref()
            .map(|flags| bytemuck::pod_collect_to_vec(&read_storage(flags)[..count * 4]));

        match self.kind {
            QueryKind::Intersection => {
                let mut hits = vec![HitRecord::MISS; count];
                backend.intersect(&self.scene, &rays, enabled.as_deref(), self.t_min, &mut hits);
                write_storage(&self.output)[..count * HIT_SIZE]
                    .copy_from_slice(bytemuck::cast_slice(&hits));
            }
            QueryKind::Occlusion => {
                let mut results = vec![0i32; count];
                backend.occlude(&self.scene, &rays, enabled.as_deref(), self.t_min, &mut results);
                write_storage(&self.output)[..count * OCCLUSION_SIZE]
                    .copy_from_slice(bytemuck::cast_slice(&results));
            }
        }

        log::trace!(
            "{:?} query traced {count} rays against scene revision {}",
            self.kind,
            self.scene.revision()
        );
    }
}

impl std::fmt::Debug for QueryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryJob")
            .field("kind", &self.kind)
            .field("ray_count", &self.ray_count)
            .field("revision", &self.scene.revision())
            .finish_non_exhaustive()
    }
}
