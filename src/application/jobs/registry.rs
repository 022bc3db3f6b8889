use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::domain::jobs::{JobUpdate, RenderJob};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("render job `{id}` already exists")]
    DuplicateId { id: String },
}

/// In-memory store of render jobs, shared by the HTTP layer and every
/// in-flight pipeline.
///
/// Records live for the lifetime of the process unless the retention sweeper
/// evicts them. Each `update` holds the shard write lock for the whole merge,
/// so readers never observe a half-applied change.
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, RenderJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Insert a fresh `PENDING` record. An existing record with the same id is
    /// left untouched.
    pub fn create(&self, id: &str) -> Result<RenderJob, RegistryError> {
        let job = match self.jobs.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateId { id: id.to_string() }),
            Entry::Vacant(vacant) => {
                let job = RenderJob::pending(id, OffsetDateTime::now_utc());
                vacant.insert(job.clone());
                job
            }
        };
        // Shard lock is released here; `len` needs every shard.
        debug!(
            target = "application::jobs::registry",
            job_id = %id,
            total = self.jobs.len(),
            "render job created"
        );
        Ok(job)
    }

    /// Merge `update` into the record for `id`. Unknown ids are ignored.
    pub fn update(&self, id: &str, update: JobUpdate) {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                job.apply(&update, OffsetDateTime::now_utc());
                debug!(
                    target = "application::jobs::registry",
                    job_id = %id,
                    status = job.status.as_str(),
                    progress = job.progress,
                    "render job updated"
                );
            }
            None => {
                debug!(
                    target = "application::jobs::registry",
                    job_id = %id,
                    "update for unknown render job ignored"
                );
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<RenderJob> {
        self.jobs.get(id).map(|job| job.value().clone())
    }

    /// Snapshot of every record, newest first.
    pub fn list(&self) -> Vec<RenderJob> {
        let mut jobs: Vec<RenderJob> = self.jobs.iter().map(|job| job.value().clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop terminal records that finished more than `retention` before `now`.
    /// Returns the number of evicted records.
    pub fn evict_finished(&self, retention: Duration, now: OffsetDateTime) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) if job.status.is_terminal() => now - finished_at < retention,
            _ => true,
        });
        let evicted = before.saturating_sub(self.jobs.len());
        if evicted > 0 {
            info!(
                target = "application::jobs::registry",
                evicted,
                remaining = self.jobs.len(),
                "evicted finished render jobs"
            );
        }
        evicted
    }
}
