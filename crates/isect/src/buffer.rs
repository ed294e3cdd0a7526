//! Byte buffers shared between the host and the device queue.
//!
//! A buffer is either idle, mapped for host access, or referenced by one or
//! more in-flight queries. The manager refuses transitions that would let the
//! host and the device touch the same bytes concurrently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytemuck::Pod;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::handle::{BufferHandle, BufferKey};

/// Host access mode of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Read the buffer once pending queries have written it.
    Read,
    /// Overwrite a range; written back on unmap.
    Write,
}

pub(crate) type Storage = Arc<RwLock<Vec<u8>>>;

pub(crate) fn read_storage(storage: &Storage) -> RwLockReadGuard<'_, Vec<u8>> {
    storage.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_storage(storage: &Storage) -> RwLockWriteGuard<'_, Vec<u8>> {
    storage.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock_staging(staging: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    staging.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a buffer as referenced by queued work until dropped.
#[derive(Debug)]
pub(crate) struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    storage: Storage,
    size: usize,
    /// Mode and serial of the live mapping.
    mapped: Option<(MapMode, u64)>,
    in_flight: Arc<AtomicUsize>,
}

impl BufferEntry {
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn storage(&self) -> Storage {
        Arc::clone(&self.storage)
    }

    pub(crate) fn mark_in_flight(&self) -> InFlight {
        InFlight::new(&self.in_flight)
    }
}

/// What [`BufferManager::begin_map`] hands back to the caller.
pub(crate) struct MapStart {
    pub storage: Storage,
    pub serial: u64,
}

#[derive(Debug)]
pub(crate) struct BufferManager {
    buffers: SlotMap<BufferKey, BufferEntry>,
    max_bytes: usize,
    next_serial: u64,
}

impl BufferManager {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            max_bytes,
            next_serial: 0,
        }
    }

    pub(crate) fn create(&mut self, size: usize, initial: Option<&[u8]>) -> Result<BufferKey> {
        if size == 0 {
            return Err(Error::InvalidArgument("buffer size must be positive".into()));
        }
        if let Some(data) = initial {
            if data.len() > size {
                return Err(Error::InvalidArgument(format!(
                    "initial data is {} bytes but buffer is {size}",
                    data.len()
                )));
            }
        }
        if size > self.max_bytes {
            return Err(Error::OutOfMemory { requested: size });
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory { requested: size })?;
        bytes.resize(size, 0);
        if let Some(data) = initial {
            bytes[..data.len()].copy_from_slice(data);
        }

        Ok(self.buffers.insert(BufferEntry {
            storage: Arc::new(RwLock::new(bytes)),
            size,
            mapped: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }))
    }

    pub(crate) fn get(&self, key: BufferKey) -> Result<&BufferEntry> {
        self.buffers.get(key).ok_or(Error::InvalidHandle("buffer"))
    }

    pub(crate) fn delete(&mut self, key: BufferKey) -> Result<()> {
        let entry = self.get(key)?;
        if entry.is_mapped() {
            return Err(Error::BufferInUse("cannot delete a mapped buffer".into()));
        }
        if entry.in_flight() > 0 {
            return Err(Error::BufferInUse(
                "cannot delete a buffer used by a pending query".into(),
            ));
        }
        self.buffers.remove(key);
        Ok(())
    }

    /// Validate a map request and mark the buffer mapped.
    pub(crate) fn begin_map(
        &mut self,
        key: BufferKey,
        mode: MapMode,
        offset: usize,
        size: usize,
    ) -> Result<MapStart> {
        let serial = self.next_serial;
        let entry = self.buffers.get_mut(key).ok_or(Error::InvalidHandle("buffer"))?;

        if size == 0 || offset.checked_add(size).map_or(true, |end| end > entry.size) {
            return Err(Error::InvalidArgument(format!(
                "map range {offset}+{size} outside buffer of {} bytes",
                entry.size
            )));
        }
        if entry.is_mapped() {
            return Err(Error::BufferInUse("buffer is already mapped".into()));
        }
        if mode == MapMode::Write && entry.in_flight() > 0 {
            return Err(Error::BufferInUse(
                "cannot map for write while a query uses the buffer".into(),
            ));
        }

        entry.mapped = Some((mode, serial));
        self.next_serial += 1;
        Ok(MapStart {
            storage: entry.storage(),
            serial,
        })
    }

    /// Release the mapping identified by `serial`.
    pub(crate) fn end_map(&mut self, key: BufferKey, serial: u64) -> Result<MapMode> {
        let entry = self.buffers.get_mut(key).ok_or(Error::InvalidHandle("buffer"))?;
        match entry.mapped {
            Some((mode, live)) if live == serial => {
                entry.mapped = None;
                Ok(mode)
            }
            _ => Err(Error::InvalidArgument(
                "mapping does not match the buffer's live mapping".into(),
            )),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }
}

/// Queued copy of a buffer range into a read mapping.
#[derive(Debug)]
pub(crate) struct MapJob {
    pub storage: Storage,
    pub offset: usize,
    pub size: usize,
    pub staging: Arc<Mutex<Vec<u8>>>,
}

impl MapJob {
    pub(crate) fn run(&self) {
        let source = read_storage(&self.storage);
        let mut staging = lock_staging(&self.staging);
        staging.clear();
        staging.extend_from_slice(&source[self.offset..self.offset + self.size]);
    }
}

/// Host view of a mapped buffer range.
///
/// Accessors block until the map event completes. Pass the mapping back to
/// [`crate::IntersectionApi::unmap_buffer`] to release the buffer; a write
/// mapping's contents are copied into the buffer at that point. Dropping a
/// mapping without unmapping leaves the buffer mapped.
#[derive(Debug)]
pub struct Mapping {
    pub(crate) buffer: BufferHandle,
    pub(crate) mode: MapMode,
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) serial: u64,
    pub(crate) staging: Arc<Mutex<Vec<u8>>>,
    pub(crate) ready: Event,
}

impl Mapping {
    /// The mapped buffer.
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Access mode.
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// Byte offset of the range within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte length of the range.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy of the mapped bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.ready.wait()?;
        Ok(lock_staging(&self.staging).clone())
    }

    /// Mapped bytes reinterpreted as records of type `T`.
    pub fn read_records<T: Pod>(&self) -> Result<Vec<T>> {
        self.ready.wait()?;
        let record = std::mem::size_of::<T>();
        let staging = lock_staging(&self.staging);
        if record == 0 || staging.len() % record != 0 {
            return Err(Error::InvalidArgument(format!(
                "mapped range of {} bytes is not a whole number of {record}-byte records",
                staging.len()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&staging[..]))
    }

    /// Overwrite bytes at `offset` within the mapped range.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if self.mode != MapMode::Write {
            return Err(Error::InvalidArgument("mapping is read-only".into()));
        }
        self.ready.wait()?;
        let mut staging = lock_staging(&self.staging);
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= staging.len())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "write of {} bytes at {offset} exceeds mapped range of {}",
                    data.len(),
                    staging.len()
                ))
            })?;
        staging[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Overwrite records starting at record index `first`.
    pub fn write_records<T: Pod>(&mut self, first: usize, records: &[T]) -> Result<()> {
        let offset = first
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| Error::InvalidArgument("record offset overflows".into()))?;
        self.write_bytes(offset, bytemuck::cast_slice(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_zeroed_and_initialized() {
        let mut manager = BufferManager::new(1024);
        let key = manager.create(8, Some(&[1, 2, 3])).unwrap();
        let entry = manager.get(key).unwrap();
        assert_eq!(entry.size(), 8);
        assert_eq!(*read_storage(&entry.storage()), vec![1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_create_rejects_bad_sizes() {
        let mut manager = BufferManager::new(16);
        assert!(matches!(manager.create(0, None), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            manager.create(2, Some(&[0; 3])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.create(17, None),
            Err(Error::OutOfMemory { requested: 17 })
        ));
    }

    #[test]
    fn test_map_state_machine() {
        let mut manager = BufferManager::new(1024);
        let key = manager.create(16, None).unwrap();

        let start = manager.begin_map(key, MapMode::Read, 0, 16).unwrap();
        assert!(matches!(
            manager.begin_map(key, MapMode::Read, 0, 4),
            Err(Error::BufferInUse(_))
        ));
        assert!(matches!(manager.delete(key), Err(Error::BufferInUse(_))));

        // A stale serial does not release the live mapping.
        assert!(manager.end_map(key, start.serial + 1).is_err());
        assert_eq!(manager.end_map(key, start.serial).unwrap(), MapMode::Read);
        assert!(manager.end_map(key, start.serial).is_err());
        assert!(manager.delete(key).is_ok());
        assert!(matches!(manager.get(key), Err(Error::InvalidHandle("buffer"))));
    }

    #[test]
    fn test_map_range_checked() {
        let mut manager = BufferManager::new(1024);
        let key = manager.create(16, None).unwrap();
        assert!(manager.begin_map(key, MapMode::Read, 8, 9).is_err());
        assert!(manager.begin_map(key, MapMode::Read, 0, 0).is_err());
        assert!(manager.begin_map(key, MapMode::Read, usize::MAX, 2).is_err());
        assert!(manager.begin_map(key, MapMode::Read, 8, 8).is_ok());
    }

    #[test]
    fn test_in_flight_blocks_write_map_and_delete() {
        let mut manager = BufferManager::new(1024);
        let key = manager.create(16, None).unwrap();
        let guard = manager.get(key).unwrap().mark_in_flight();

        assert!(matches!(
            manager.begin_map(key, MapMode::Write, 0, 16),
            Err(Error::BufferInUse(_))
        ));
        assert!(matches!(manager.delete(key), Err(Error::BufferInUse(_))));

        drop(guard);
        assert_eq!(manager.get(key).unwrap().in_flight(), 0);
        assert!(manager.begin_map(key, MapMode::Write, 0, 16).is_ok());
    }

    #[test]
    fn test_mapping_write_and_read_records() {
        let staging = Arc::new(Mutex::new(vec![0u8; 8]));
        let mut manager = BufferManager::new(64);
        let key = manager.create(8, None).unwrap();
        let mut mapping = Mapping {
            buffer: BufferHandle {
                key,
                owner: crate::handle::InstanceId::next(),
            },
            mode: MapMode::Write,
            offset: 0,
            size: 8,
            serial: 0,
            staging,
            ready: Event::completed(),
        };

        mapping.write_records(1, &[7i32]).unwrap();
        assert_eq!(mapping.read_records::<i32>().unwrap(), vec![0, 7]);
        assert!(mapping.write_records(2, &[1i32]).is_err());
    }

    #[test]
    fn test_map_job_copies_range() {
        let storage: Storage = Arc::new(RwLock::new((0u8..16).collect()));
        let staging = Arc::new(Mutex::new(Vec::new()));
        MapJob {
            storage,
            offset: 4,
            size: 3,
            staging: Arc::clone(&staging),
        }
        .run();
        assert_eq!(*lock_staging(&staging), vec![4, 5, 6]);
    }
}
