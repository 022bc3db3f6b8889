//! Render job records and the closed set of fields a pipeline may change.

use time::OffsetDateTime;

use montage_api_types::RenderJobView;

pub use montage_api_types::JobStatus;

/// Canonical state of one render job, owned by the job registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub output_path: Option<String>,
    pub error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Set when the job reaches a terminal status.
    pub finished_at: Option<OffsetDateTime>,
}

impl RenderJob {
    pub fn pending(id: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0,
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Merge `update` into the record. Fields left as `None` are untouched.
    pub fn apply(&mut self, update: &JobUpdate, now: OffsetDateTime) {
        if let Some(status) = update.status {
            self.status = status;
            if status.is_terminal() && self.finished_at.is_none() {
                self.finished_at = Some(now);
            }
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(output_path) = update.output_path.as_ref() {
            self.output_path = Some(output_path.clone());
        }
        if let Some(error) = update.error.as_ref() {
            self.error = Some(error.clone());
        }
        self.updated_at = now;
    }

    /// Outward view of the record. The output location is only exposed once
    /// the job completed and the error only once it failed.
    pub fn view(&self, public_base_url: &str) -> RenderJobView {
        let output_path = self
            .output_path
            .clone()
            .filter(|_| self.status == JobStatus::Completed);
        let url = output_path
            .as_deref()
            .map(|path| format!("{}{path}", public_base_url.trim_end_matches('/')));
        let error = self
            .error
            .clone()
            .filter(|_| self.status == JobStatus::Failed);

        RenderJobView {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            output_path,
            url,
            error,
        }
    }
}

/// Partial change to a [`RenderJob`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn processing(progress: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn completed(output_path: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            output_path: Some(output_path.into()),
            error: None,
        }
    }

    /// Terminal failure. Progress is deliberately left out so the record keeps
    /// the last value it reached.
    pub fn failed(error: impl Into<String>) -> Self {
        let mut message = error.into();
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        Self {
            status: Some(JobStatus::Failed),
            error: Some(message),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_leaves_unmentioned_fields_alone() {
        let now = OffsetDateTime::now_utc();
        let mut job = RenderJob::pending("job-1", now);
        job.apply(&JobUpdate::processing(10), now);
        job.apply(&JobUpdate::progress(42), now);

        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 42);
        assert!(job.output_path.is_none());
        assert!(job.error.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn failure_keeps_progress_and_stamps_finish_time() {
        let now = OffsetDateTime::now_utc();
        let mut job = RenderJob::pending("job-1", now);
        job.apply(&JobUpdate::processing(63), now);
        job.apply(&JobUpdate::failed("encoder exploded"), now);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 63);
        assert_eq!(job.error.as_deref(), Some("encoder exploded"));
        assert_eq!(job.finished_at, Some(now));
    }

    #[test]
    fn failure_message_is_never_empty() {
        let update = JobUpdate::failed("  ");
        assert_eq!(update.error.as_deref(), Some("unknown error"));
    }

    #[test]
    fn completion_pins_progress_to_100() {
        let now = OffsetDateTime::now_utc();
        let mut job = RenderJob::pending("job-1", now);
        job.apply(&JobUpdate::completed("/renders/job-1.mp4"), now);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path.as_deref(), Some("/renders/job-1.mp4"));
    }

    #[test]
    fn view_exposes_url_only_for_completed_jobs() {
        let now = OffsetDateTime::now_utc();
        let mut job = RenderJob::pending("job-1", now);
        job.apply(&JobUpdate::completed("/renders/job-1.mp4"), now);

        let view = job.view("http://localhost:3002/");
        assert_eq!(view.output_path.as_deref(), Some("/renders/job-1.mp4"));
        assert_eq!(
            view.url.as_deref(),
            Some("http://localhost:3002/renders/job-1.mp4")
        );
        assert!(view.error.is_none());

        let mut failed = RenderJob::pending("job-2", now);
        failed.apply(&JobUpdate::failed("boom"), now);
        let view = failed.view("http://localhost:3002");
        assert!(view.output_path.is_none());
        assert!(view.url.is_none());
        assert_eq!(view.error.as_deref(), Some("boom"));
    }
}
