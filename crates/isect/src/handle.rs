//! Opaque handles to objects owned by an API instance.
//!
//! Each handle pairs a generational slot key with the id of the instance
//! that issued it, so a deleted handle or one from another instance is
//! reported as an error instead of resolving to the wrong object.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

slotmap::new_key_type! {
    pub(crate) struct ShapeKey;
    pub(crate) struct BufferKey;
    pub(crate) struct EventKey;
}

/// Identity of one API instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Fail with [`Error::ForeignHandle`] unless `owner` is this instance.
    pub(crate) fn check(self, owner: InstanceId) -> Result<()> {
        if self == owner {
            Ok(())
        } else {
            Err(Error::ForeignHandle)
        }
    }
}

/// Handle to a mesh shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeHandle {
    pub(crate) key: ShapeKey,
    pub(crate) owner: InstanceId,
}

/// Handle to a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) key: BufferKey,
    pub(crate) owner: InstanceId,
}

/// Handle to a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    pub(crate) key: EventKey,
    pub(crate) owner: InstanceId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_unique() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert_ne!(a, b);
        assert!(a.check(a).is_ok());
        assert!(matches!(a.check(b), Err(Error::ForeignHandle)));
    }
}
