//! The intersection API facade.

use std::sync::Arc;

use bytemuck::Pod;
use slotmap::SlotMap;

use crate::backend::{self, Backend};
use crate::buffer::{read_storage, write_storage, BufferManager, MapJob, MapMode, Mapping};
use crate::config::{Config, StalePolicy};
use crate::device::{self, DeviceInfo};
use crate::error::{Error, Result};
use crate::event::{Event, EventStatus};
use crate::handle::{BufferHandle, EventHandle, EventKey, InstanceId, ShapeHandle, ShapeKey};
use crate::query::{QueryJob, QueryKind};
use crate::queue::{DeviceQueue, Job};
use crate::records::RAY_SIZE;
use crate::scene::{SceneSnapshot, SceneStats};
use crate::shape::{GeometryStore, MeshDesc};

/// How a query call reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Return once results are written.
    Blocking,
    /// Return immediately with an event to wait on.
    Event,
}

/// One intersection engine instance bound to a device.
///
/// Shapes, buffers and events created here are only valid with this
/// instance. Dropping the instance waits for queued work to finish.
pub struct IntersectionApi {
    id: InstanceId,
    config: Config,
    backend: Arc<dyn Backend>,
    geometry: GeometryStore,
    buffers: BufferManager,
    events: SlotMap<EventKey, Event>,
    scene: Option<Arc<SceneSnapshot>>,
    queue: DeviceQueue,
}

impl std::fmt::Debug for IntersectionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntersectionApi")
            .field("device", self.backend.device())
            .field("shapes", &self.geometry.len())
            .field("buffers", &self.buffers.len())
            .field("events", &self.events.len())
            .field("revision", &self.geometry.revision())
            .finish_non_exhaustive()
    }
}

impl IntersectionApi {
    /// Devices available under `config`.
    pub fn enumerate_devices(config: &Config) -> Vec<DeviceInfo> {
        device::enumerate(config)
    }

    /// Number of devices available under `config`.
    pub fn device_count(config: &Config) -> usize {
        device::enumerate(config).len()
    }

    /// Descriptor of device `index`.
    pub fn device_info(config: &Config, index: usize) -> Result<DeviceInfo> {
        let devices = device::enumerate(config);
        let count = devices.len();
        devices.into_iter().nth(index).ok_or_else(|| {
            Error::DeviceUnavailable(format!("device {index} requested, {count} available"))
        })
    }

    /// Create an instance on device `device_index`.
    pub fn create(device_index: usize, config: Config) -> Result<Self> {
        config.validate()?;
        let device = Self::device_info(&config, device_index)?;
        let backend = backend::create(&device)?;
        Self::with_backend(backend, config)
    }

    /// Create an instance on an existing backend.
    pub fn with_backend(backend: Arc<dyn Backend>, config: Config) -> Result<Self> {
        config.validate()?;
        let queue = DeviceQueue::spawn(Arc::clone(&backend))?;
        log::info!("created intersection API on {}", backend.device().name);
        Ok(Self {
            id: InstanceId::next(),
            buffers: BufferManager::new(config.max_buffer_bytes),
            config,
            backend,
            geometry: GeometryStore::default(),
            events: SlotMap::with_key(),
            scene: None,
            queue,
        })
    }

    /// Device serving this instance.
    pub fn device(&self) -> &DeviceInfo {
        self.backend.device()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- Geometry ----

    /// Create a detached shape from mesh data. The data is copied.
    pub fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> Result<ShapeHandle> {
        let key = self.geometry.create_mesh(desc)?;
        Ok(ShapeHandle {
            key,
            owner: self.id,
        })
    }

    fn shape_key(&self, shape: ShapeHandle) -> Result<ShapeKey> {
        self.id.check(shape.owner)?;
        Ok(shape.key)
    }

    /// Add a shape to the scene. Attaching twice is a no-op.
    pub fn attach_shape(&mut self, shape: ShapeHandle) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.attach(key)
    }

    /// Remove a shape from the scene. Detaching a detached shape is a no-op.
    pub fn detach_shape(&mut self, shape: ShapeHandle) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.detach(key)
    }

    /// Destroy a detached shape.
    pub fn delete_shape(&mut self, shape: ShapeHandle) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.delete(key)
    }

    /// Set the id reported in hit records.
    pub fn set_shape_id(&mut self, shape: ShapeHandle, id: i32) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.set_id(key, id)
    }

    /// Id reported in hit records.
    pub fn shape_id(&self, shape: ShapeHandle) -> Result<i32> {
        let key = self.shape_key(shape)?;
        Ok(self.geometry.get(key)?.id())
    }

    /// Set the visibility mask; rays only see shapes sharing a mask bit.
    pub fn set_shape_mask(&mut self, shape: ShapeHandle, mask: u32) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.set_mask(key, mask)
    }

    /// Show or hide an attached shape without detaching it.
    pub fn set_shape_visible(&mut self, shape: ShapeHandle, visible: bool) -> Result<()> {
        let key = self.shape_key(shape)?;
        self.geometry.set_visible(key, visible)
    }

    /// Number of attached shapes.
    pub fn attached_shape_count(&self) -> usize {
        self.geometry.attached_count()
    }

    /// Rebuild the acceleration structure from the attached shapes.
    ///
    /// Runs on the calling thread. Queries submitted earlier keep the
    /// snapshot they were submitted against. On failure the previous
    /// snapshot stays in place.
    pub fn commit(&mut self) -> Result<()> {
        if self.is_scene_current() {
            log::debug!("commit: scene already current");
            return Ok(());
        }

        let revision = self.geometry.revision();
        let prims = self.geometry.collect_primitives();
        let settings = self.config.build_settings();
        let scene = self.backend.build_scene(prims, revision, &settings)?;

        let stats = scene.stats();
        log::info!(
            "committed scene revision {revision}: {} triangles ({} excluded), {} nodes, depth {}",
            stats.triangles,
            stats.excluded,
            stats.nodes,
            stats.depth
        );
        self.scene = Some(Arc::new(scene));
        Ok(())
    }

    /// True if the committed scene reflects every edit.
    pub fn is_scene_current(&self) -> bool {
        self.scene
            .as_ref()
            .is_some_and(|s| s.revision() == self.geometry.revision())
    }

    /// Summary of the last committed scene.
    pub fn scene_stats(&self) -> Option<SceneStats> {
        self.scene.as_ref().map(|s| s.stats())
    }

    fn current_scene(&mut self) -> Result<Arc<SceneSnapshot>> {
        if self.is_scene_current() {
            if let Some(scene) = &self.scene {
                return Ok(Arc::clone(scene));
            }
        }
        match self.config.stale_policy {
            StalePolicy::Reject => Err(Error::StaleScene),
            StalePolicy::AutoCommit => {
                log::debug!("auto-committing stale scene");
                self.commit()?;
                self.scene.clone().ok_or(Error::StaleScene)
            }
        }
    }

    // ---- Buffers ----

    /// Allocate `size` zeroed bytes, optionally initialised from `initial`.
    pub fn create_buffer(&mut self, size: usize, initial: Option<&[u8]>) -> Result<BufferHandle> {
        let key = self.buffers.create(size, initial)?;
        Ok(BufferHandle {
            key,
            owner: self.id,
        })
    }

    /// Allocate a buffer holding exactly `records`.
    pub fn create_buffer_from<T: Pod>(&mut self, records: &[T]) -> Result<BufferHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(records);
        self.create_buffer(bytes.len(), Some(bytes))
    }

    /// Size of a buffer in bytes.
    pub fn buffer_size(&self, buffer: BufferHandle) -> Result<usize> {
        self.id.check(buffer.owner)?;
        Ok(self.buffers.get(buffer.key)?.size())
    }

    /// Map `size` bytes at `offset` for host access.
    ///
    /// A read mapping is filled once queries submitted before it have
    /// finished; the returned event signals that point. A write mapping is
    /// ready immediately and is refused while a query uses the buffer.
    pub fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        mode: MapMode,
        offset: usize,
        size: usize,
    ) -> Result<(Mapping, EventHandle)> {
        self.id.check(buffer.owner)?;
        let start = self.buffers.begin_map(buffer.key, mode, offset, size)?;

        let (staging, ready) = match mode {
            MapMode::Write => {
                let current = read_storage(&start.storage)[offset..offset + size].to_vec();
                (Arc::new(std::sync::Mutex::new(current)), Event::completed())
            }
            MapMode::Read => {
                let staging = Arc::new(std::sync::Mutex::new(Vec::new()));
                let job = MapJob {
                    storage: start.storage,
                    offset,
                    size,
                    staging: Arc::clone(&staging),
                };
                match self.queue.submit(Job::ReadMap(job)) {
                    Ok(event) => (staging, event),
                    Err(e) => {
                        self.buffers.end_map(buffer.key, start.serial)?;
                        return Err(e);
                    }
                }
            }
        };

        let mapping = Mapping {
            buffer,
            mode,
            offset,
            size,
            serial: start.serial,
            staging,
            ready: ready.clone(),
        };
        Ok((mapping, self.register_event(ready)))
    }

    /// Release a mapping, writing back its contents if mapped for write.
    pub fn unmap_buffer(&mut self, mapping: Mapping) -> Result<()> {
        self.id.check(mapping.buffer.owner)?;
        let key = mapping.buffer.key;
        let mode = self.buffers.end_map(key, mapping.serial)?;
        if mode == MapMode::Write {
            let data = mapping.bytes()?;
            let storage = self.buffers.get(key)?.storage();
            write_storage(&storage)[mapping.offset..mapping.offset + data.len()]
                .copy_from_slice(&data);
        }
        Ok(())
    }

    /// Free a buffer that is neither mapped nor used by a pending query.
    pub fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        self.id.check(buffer.owner)?;
        self.buffers.delete(buffer.key)
    }

    // ---- Queries ----

    /// Closest hit for `ray_count` rays from `rays`, written to `hits`.
    ///
    /// `enabled` optionally holds one `i32` per ray; zero entries skip the
    /// ray and report a miss.
    pub fn query_intersection(
        &mut self,
        rays: BufferHandle,
        ray_count: usize,
        hits: BufferHandle,
        enabled: Option<BufferHandle>,
        completion: Completion,
    ) -> Result<Option<EventHandle>> {
        self.submit_query(QueryKind::Intersection, rays, ray_count, hits, enabled, completion)
    }

    /// Any hit for `ray_count` rays from `rays`; writes `1` or `-1` per ray
    /// to `results`.
    pub fn query_occlusion(
        &mut self,
        rays: BufferHandle,
        ray_count: usize,
        results: BufferHandle,
        enabled: Option<BufferHandle>,
        completion: Completion,
    ) -> Result<Option<EventHandle>> {
        self.submit_query(QueryKind::Occlusion, rays, ray_count, results, enabled, completion)
    }

    fn check_query_buffer(&self, buffer: BufferHandle, needed: usize, role: &str) -> Result<()> {
        self.id.check(buffer.owner)?;
        let entry = self.buffers.get(buffer.key)?;
        if entry.size() < needed {
            return Err(Error::InvalidArgument(format!(
                "{role} buffer holds {} bytes, query needs {needed}",
                entry.size()
            )));
        }
        if entry.is_mapped() {
            return Err(Error::BufferInUse(format!("{role} buffer is mapped")));
        }
        Ok(())
    }

    fn submit_query(
        &mut self,
        kind: QueryKind,
        rays: BufferHandle,
        ray_count: usize,
        output: BufferHandle,
        enabled: Option<BufferHandle>,
        completion: Completion,
    ) -> Result<Option<EventHandle>> {
        let bytes_for = |size: usize| {
            ray_count
                .checked_mul(size)
                .ok_or_else(|| Error::InvalidArgument(format!("ray count {ray_count} overflows")))
        };
        self.check_query_buffer(rays, bytes_for(RAY_SIZE)?, "ray")?;
        self.check_query_buffer(output, bytes_for(kind.output_size())?, "output")?;
        if let Some(flags) = enabled {
            self.check_query_buffer(flags, bytes_for(std::mem::size_of::<i32>())?, "enable")?;
        }
        if rays.key == output.key || enabled.is_some_and(|e| e.key == output.key) {
            return Err(Error::InvalidArgument(
                "query output must not share a buffer with its inputs".into(),
            ));
        }

        let scene = self.current_scene()?;

        let mut guards = Vec::with_capacity(3);
        let rays_entry = self.buffers.get(rays.key)?;
        guards.push(rays_entry.mark_in_flight());
        let rays_storage = rays_entry.storage();
        let output_entry = self.buffers.get(output.key)?;
        guards.push(output_entry.mark_in_flight());
        let output_storage = output_entry.storage();
        let enabled_storage = match enabled {
            Some(flags) => {
                let entry = self.buffers.get(flags.key)?;
                guards.push(entry.mark_in_flight());
                Some(entry.storage())
            }
            None => None,
        };

        let job = QueryJob {
            kind,
            scene,
            rays: rays_storage,
            output: output_storage,
            enabled: enabled_storage,
            ray_count,
            t_min: self.config.t_min,
            _guards: guards,
        };
        log::debug!("submitting {kind:?} query for {ray_count} rays");
        let event = self.queue.submit(Job::Query(job))?;

        match completion {
            Completion::Blocking => {
                event.wait()?;
                Ok(None)
            }
            Completion::Event => Ok(Some(self.register_event(event))),
        }
    }

    // ---- Events ----

    fn register_event(&mut self, event: Event) -> EventHandle {
        EventHandle {
            key: self.events.insert(event),
            owner: self.id,
        }
    }

    fn event(&self, event: EventHandle) -> Result<&Event> {
        self.id.check(event.owner)?;
        self.events.get(event.key).ok_or(Error::InvalidHandle("event"))
    }

    /// Block until the event's operation finishes.
    pub fn wait_event(&self, event: EventHandle) -> Result<()> {
        self.event(event)?.wait()
    }

    /// Poll an event without blocking.
    pub fn event_status(&self, event: EventHandle) -> Result<EventStatus> {
        Ok(self.event(event)?.status())
    }

    /// Release an event. A pending operation still runs to completion.
    pub fn delete_event(&mut self, event: EventHandle) -> Result<()> {
        self.id.check(event.owner)?;
        let removed = self
            .events
            .remove(event.key)
            .ok_or(Error::InvalidHandle("event"))?;
        if removed.status() == EventStatus::Pending {
            log::warn!("deleted event of a pending operation; it still runs to completion");
        }
        Ok(())
    }
}

impl Drop for IntersectionApi {
    fn drop(&mut self) {
        log::debug!(
            "releasing intersection API: {} shapes, {} buffers, {} events",
            self.geometry.len(),
            self.buffers.len(),
            self.events.len()
        );
    }
}
