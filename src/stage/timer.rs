use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Identifier of a scheduled job, usable with [`Scheduler::cancel`].
pub type ScheduleId = Uuid;

/// Deferred and repeating callbacks on the stage's runtime.
///
/// Jobs run as plain tasks; a callback that needs to reach an actor sends
/// through a proxy like everyone else.
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    jobs: Arc<DashMap<ScheduleId, JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new(handle: Handle) -> Self {
        Scheduler {
            handle,
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Runs `job` once after `delay`.
    pub fn schedule_once(
        &self,
        delay: Duration,
        job: impl FnOnce() + Send + 'static,
    ) -> ScheduleId {
        let id = Uuid::new_v4();
        let jobs = self.jobs.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job();
            jobs.remove(&id);
        });
        self.jobs.insert(id, task);
        id
    }

    /// Runs `job` every `interval`, the first time after `initial_delay`.
    pub fn schedule(
        &self,
        initial_delay: Duration,
        interval: Duration,
        mut job: impl FnMut() + Send + 'static,
    ) -> ScheduleId {
        let id = Uuid::new_v4();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                job();
                tokio::time::sleep(interval).await;
            }
        });
        self.jobs.insert(id, task);
        id
    }

    /// Cancels a scheduled job; returns whether it was still pending.
    pub fn cancel(&self, id: ScheduleId) -> bool {
        match self.jobs.remove(&id) {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn shutdown(&self) {
        self.jobs.retain(|_, task| {
            task.abort();
            false
        });
    }
}
