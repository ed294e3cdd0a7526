//! Device backends.
//!
//! A backend turns collected geometry into a [`SceneSnapshot`] and answers
//! ray batches against it. Which implementation serves an instance is
//! decided once, from the chosen [`DeviceInfo`].

use std::sync::Arc;

use isect_kernel::BuildSettings;
use rayon::prelude::*;

use crate::config::Config;
use crate::device::{DeviceInfo, DeviceKind};
use crate::error::{Error, Result};
use crate::records::{HitRecord, RayRecord, NULL_ID};
use crate::scene::{ScenePrimitive, SceneSnapshot};

/// Occlusion result written for blocked rays.
pub const OCCLUDED: i32 = 1;

/// Compute device able to build scenes and trace ray batches.
pub trait Backend: Send + Sync {
    /// Device this backend runs on.
    fn device(&self) -> &DeviceInfo;

    /// Build the acceleration structure for `prims`.
    fn build_scene(
        &self,
        prims: Vec<ScenePrimitive>,
        revision: u64,
        settings: &BuildSettings,
    ) -> Result<SceneSnapshot> {
        SceneSnapshot::build(prims, revision, settings)
    }

    /// Closest hit per ray. Rays whose `enabled` entry is zero miss.
    fn intersect(
        &self,
        scene: &SceneSnapshot,
        rays: &[RayRecord],
        enabled: Option<&[i32]>,
        t_min: f32,
        hits: &mut [HitRecord],
    );

    /// [`OCCLUDED`] or [`NULL_ID`] per ray. Rays whose `enabled` entry is
    /// zero are reported unoccluded.
    fn occlude(
        &self,
        scene: &SceneSnapshot,
        rays: &[RayRecord],
        enabled: Option<&[i32]>,
        t_min: f32,
        results: &mut [i32],
    );
}

/// Create the backend serving `device`.
pub fn create(device: &DeviceInfo) -> Result<Arc<dyn Backend>> {
    match device.kind {
        DeviceKind::Cpu => Ok(Arc::new(CpuBackend::new(device.clone())?)),
        kind => Err(Error::DeviceUnavailable(format!(
            "no backend for {kind:?} devices"
        ))),
    }
}

/// Multi-threaded CPU backend with its own worker pool.
pub struct CpuBackend {
    device: DeviceInfo,
    pool: rayon::ThreadPool,
}

impl CpuBackend {
    /// Spawn a pool with `device.threads` workers.
    pub fn new(device: DeviceInfo) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(device.threads)
            .thread_name(|i| format!("isect-cpu-{i}"))
            .build()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        log::info!("CPU backend ready with {} threads", device.threads);
        Ok(Self { device, pool })
    }

    /// Backend for the first CPU device under `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let device = crate::device::enumerate(config)
            .into_iter()
            .find(|d| d.kind == DeviceKind::Cpu)
            .ok_or_else(|| Error::DeviceUnavailable("no CPU device".into()))?;
        Self::new(device)
    }
}

fn is_enabled(enabled: Option<&[i32]>, i: usize) -> bool {
    enabled.map_or(true, |flags| flags[i] != 0)
}

impl Backend for CpuBackend {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn build_scene(
        &self,
        prims: Vec<ScenePrimitive>,
        revision: u64,
        settings: &BuildSettings,
    ) -> Result<SceneSnapshot> {
        self.pool
            .install(|| SceneSnapshot::build(prims, revision, settings))
    }

    fn intersect(
        &self,
        scene: &SceneSnapshot,
        rays: &[RayRecord],
        enabled: Option<&[i32]>,
        t_min: f32,
        hits: &mut [HitRecord],
    ) {
        self.pool.install(|| {
            hits.par_iter_mut()
                .zip(rays.par_iter())
                .enumerate()
                .for_each(|(i, (hit, ray))| {
                    *hit = if is_enabled(enabled, i) {
                        scene.closest_hit(ray, t_min)
                    } else {
                        HitRecord::MISS
                    };
                });
        });
    }

    fn occlude(
        &self,
        scene: &SceneSnapshot,
        rays: &[RayRecord],
        enabled: Option<&[i32]>,
        t_min: f32,
        results: &mut [i32],
    ) {
        self.pool.install(|| {
            results
                .par_iter_mut()
                .zip(rays.par_iter())
                .enumerate()
                .for_each(|(i, (result, ray))| {
                    *result = if is_enabled(enabled, i) && scene.occluded(ray, t_min) {
                        OCCLUDED
                    } else {
                        NULL_ID
                    };
                });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PrimTag;
    use isect_kernel::Triangle;
    use isect_math::Point3;

    fn backend() -> CpuBackend {
        CpuBackend::from_config(&Config {
            worker_threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn unit_scene(backend: &CpuBackend) -> SceneSnapshot {
        let prim = ScenePrimitive {
            triangle: Triangle::new(
                Point3::new(-1.0, -1.0, 0.0),
                Point3::new(1.0, -1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ),
            tag: PrimTag {
                shape_id: 1,
                face: 0,
                fan: 0,
                mask: u32::MAX,
            },
        };
        backend
            .build_scene(vec![prim], 0, &BuildSettings::default())
            .unwrap()
    }

    fn rays() -> Vec<RayRecord> {
        vec![
            RayRecord::new([0.0, 0.0, -1.0], [0.0, 0.0, 10.0], 1000.0),
            RayRecord::new([5.0, 5.0, -1.0], [0.0, 0.0, 10.0], 1000.0),
            RayRecord::new([0.0, 0.0, -1.0], [0.0, 0.0, 10.0], 1000.0),
        ]
    }

    #[test]
    fn test_cpu_backend_device() {
        let backend = backend();
        assert_eq!(backend.device().kind, DeviceKind::Cpu);
        assert_eq!(backend.device().threads, 2);
    }

    #[test]
    fn test_intersect_batch_with_enable_flags() {
        let backend = backend();
        let scene = unit_scene(&backend);
        let mut hits = vec![HitRecord::MISS; 3];
        backend.intersect(&scene, &rays(), Some(&[1, 1, 0]), 0.0, &mut hits);
        assert_eq!(hits[0].shape_id, 1);
        assert_eq!(hits[1], HitRecord::MISS);
        assert_eq!(hits[2], HitRecord::MISS);
    }

    #[test]
    fn test_occlude_batch() {
        let backend = backend();
        let scene = unit_scene(&backend);
        let mut results = vec![0; 3];
        backend.occlude(&scene, &rays(), None, 0.0, &mut results);
        assert_eq!(results, vec![OCCLUDED, NULL_ID, OCCLUDED]);
    }

    #[test]
    fn test_no_gpu_backend() {
        let device = DeviceInfo {
            name: "gpu".into(),
            vendor: "none".into(),
            kind: DeviceKind::Gpu,
            threads: 1,
        };
        assert!(matches!(create(&device), Err(Error::DeviceUnavailable(_))));
    }
}
