use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use super::registry::JobRegistry;

pub(crate) const METRIC_JOBS_EVICTED: &str = "montage_render_jobs_evicted_total";

/// How long finished jobs stay visible to pollers.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub retention: Duration,
    pub sweep_interval: Duration,
}

/// Run one eviction pass.
pub fn sweep_once(registry: &JobRegistry, policy: &RetentionPolicy) -> usize {
    let evicted = registry.evict_finished(policy.retention, OffsetDateTime::now_utc());
    if evicted > 0 {
        counter!(METRIC_JOBS_EVICTED).increment(evicted as u64);
    }
    evicted
}

/// Periodically evict finished jobs until the returned handle is aborted.
pub fn spawn_retention_sweeper(registry: JobRegistry, policy: RetentionPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.sweep_interval);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            sweep_once(&registry, &policy);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::JobUpdate;

    #[test]
    fn zero_retention_evicts_finished_jobs_immediately() {
        let registry = JobRegistry::new();
        registry.create("done").expect("created");
        registry.create("queued").expect("created");
        registry.update("done", JobUpdate::completed("/renders/done.mp4"));

        let policy = RetentionPolicy {
            retention: Duration::ZERO,
            sweep_interval: Duration::from_secs(60),
        };

        assert_eq!(sweep_once(&registry, &policy), 1);
        assert!(registry.get("done").is_none());
        assert!(registry.get("queued").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_interval() {
        let registry = JobRegistry::new();
        registry.create("failed").expect("created");
        registry.update("failed", JobUpdate::failed("boom"));

        let policy = RetentionPolicy {
            retention: Duration::ZERO,
            sweep_interval: Duration::from_secs(5),
        };
        let handle = spawn_retention_sweeper(registry.clone(), policy);

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(registry.get("failed").is_none());

        handle.abort();
    }
}
