//! Per-instance device queue.
//!
//! Jobs run one at a time on a dedicated thread, in submission order. Each
//! job is paired with the event signaled when it finishes. A job's buffers
//! are released before its event is signaled, so a waiter never observes a
//! completed event on a buffer that is still marked in flight.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::backend::Backend;
use crate::buffer::MapJob;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::query::QueryJob;

#[derive(Debug)]
pub(crate) enum Job {
    Query(QueryJob),
    ReadMap(MapJob),
}

impl Job {
    fn run(&self, backend: &dyn Backend) {
        match self {
            Job::Query(query) => query.run(backend),
            Job::ReadMap(map) => map.run(),
        }
    }
}

pub(crate) struct DeviceQueue {
    sender: Option<mpsc::Sender<(Job, Event)>>,
    worker: Option<JoinHandle<()>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "device job panicked".to_string()
    }
}

impl DeviceQueue {
    pub(crate) fn spawn(backend: Arc<dyn Backend>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<(Job, Event)>();
        let worker = std::thread::Builder::new()
            .name("isect-queue".into())
            .spawn(move || {
                for (job, event) in receiver {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run(&*backend)));
                    drop(job);
                    match outcome {
                        Ok(()) => event.complete(),
                        Err(payload) => {
                            let message = panic_message(&*payload);
                            log::error!("device job failed: {message}");
                            event.fail(message);
                        }
                    }
                }
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to start queue: {e}")))?;

        log::debug!("device queue started");
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue `job`; the returned event signals its completion.
    pub(crate) fn submit(&self, job: Job) -> Result<Event> {
        let event = Event::new();
        self.sender
            .as_ref()
            .ok_or_else(|| Error::OperationFailed("device queue is shut down".into()))?
            .send((job, event.clone()))
            .map_err(|_| Error::OperationFailed("device queue is shut down".into()))?;
        Ok(event)
    }
}

impl Drop for DeviceQueue {
    /// Drain queued work, then join the worker.
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("device queue thread panicked");
            } else {
                log::debug!("device queue drained and stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::buffer::Storage;
    use crate::config::Config;
    use crate::event::EventStatus;
    use std::sync::{Mutex, RwLock};

    fn queue() -> DeviceQueue {
        let backend = CpuBackend::from_config(&Config {
            worker_threads: 1,
            ..Default::default()
        })
        .unwrap();
        DeviceQueue::spawn(Arc::new(backend)).unwrap()
    }

    fn map_job(storage: &Storage, offset: usize, size: usize) -> (MapJob, Arc<Mutex<Vec<u8>>>) {
        let staging = Arc::new(Mutex::new(Vec::new()));
        let job = MapJob {
            storage: Arc::clone(storage),
            offset,
            size,
            staging: Arc::clone(&staging),
        };
        (job, staging)
    }

    #[test]
    fn test_jobs_complete_in_order() {
        let queue = queue();
        let storage: Storage = Arc::new(RwLock::new(vec![1, 2, 3, 4]));
        let (first, _) = map_job(&storage, 0, 2);
        let (second, staging) = map_job(&storage, 2, 2);

        let a = queue.submit(Job::ReadMap(first)).unwrap();
        let b = queue.submit(Job::ReadMap(second)).unwrap();
        b.wait().unwrap();
        assert_eq!(a.status(), EventStatus::Complete);
        assert_eq!(*staging.lock().unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_panicking_job_fails_event() {
        let queue = queue();
        let storage: Storage = Arc::new(RwLock::new(vec![0; 4]));
        // Range past the end panics inside the job.
        let (bad, _) = map_job(&storage, 2, 8);
        let event = queue.submit(Job::ReadMap(bad)).unwrap();
        assert!(matches!(event.wait(), Err(Error::OperationFailed(_))));

        // The queue keeps serving later jobs.
        let (good, _) = map_job(&storage, 0, 4);
        assert!(queue.submit(Job::ReadMap(good)).unwrap().wait().is_ok());
    }

    #[test]
    fn test_drop_drains_queue() {
        let queue = queue();
        let storage: Storage = Arc::new(RwLock::new(vec![0; 4]));
        let (job, _) = map_job(&storage, 0, 4);
        let event = queue.submit(Job::ReadMap(job)).unwrap();
        drop(queue);
        assert_eq!(event.status(), EventStatus::Complete);
    }
}
