//! Completion events for asynchronous operations.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// State of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    /// Operation still queued or running.
    Pending,
    /// Operation finished and its outputs are visible.
    Complete,
    /// Operation failed; outputs are unspecified.
    Failed(String),
}

/// Shared one-shot completion signal.
///
/// Leaves `Pending` exactly once. Later signals are ignored.
#[derive(Debug, Clone)]
pub(crate) struct Event {
    inner: Arc<EventInner>,
}

#[derive(Debug)]
struct EventInner {
    status: Mutex<EventStatus>,
    signaled: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                status: Mutex::new(EventStatus::Pending),
                signaled: Condvar::new(),
            }),
        }
    }

    /// An event that is already complete.
    pub(crate) fn completed() -> Self {
        let event = Self::new();
        event.complete();
        event
    }

    pub(crate) fn complete(&self) {
        self.signal(EventStatus::Complete);
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        self.signal(EventStatus::Failed(message.into()));
    }

    fn signal(&self, status: EventStatus) {
        let mut current = self.lock();
        if *current == EventStatus::Pending {
            *current = status;
            self.inner.signaled.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventStatus> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> EventStatus {
        self.lock().clone()
    }

    /// Block until signaled.
    pub(crate) fn wait(&self) -> Result<()> {
        let mut status = self.lock();
        while *status == EventStatus::Pending {
            status = self
                .inner
                .signaled
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match &*status {
            EventStatus::Failed(message) => Err(Error::OperationFailed(message.clone())),
            _ => Ok(()),
        }
    }
}
