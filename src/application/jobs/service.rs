use std::sync::Arc;

use metrics::counter;
use montage_api_types::RenderOptions;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    application::{
        error::AppError,
        render::{RenderJobRequest, RenderPipeline},
    },
    domain::jobs::{JobUpdate, RenderJob},
};

use super::registry::JobRegistry;

pub(crate) const METRIC_JOBS_SUBMITTED: &str = "montage_render_jobs_submitted_total";

/// Entry point for submitting and inspecting render jobs.
#[derive(Clone)]
pub struct RenderJobService {
    registry: JobRegistry,
    pipeline: Arc<RenderPipeline>,
}

impl RenderJobService {
    pub fn new(pipeline: Arc<RenderPipeline>) -> Self {
        Self {
            registry: pipeline.registry().clone(),
            pipeline,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register a new job and start rendering it in the background.
    ///
    /// Returns as soon as the job is recorded and its task is spawned; the
    /// design's shape is only checked once the pipeline runs.
    pub fn submit(
        &self,
        design: Option<serde_json::Value>,
        options: RenderOptions,
    ) -> Result<RenderJob, AppError> {
        let Some(design) = design.filter(|design| !is_blank(design)) else {
            return Err(AppError::validation("design data is required"));
        };

        let job_id = Uuid::new_v4().simple().to_string();
        let job = self.registry.create(&job_id)?;
        counter!(METRIC_JOBS_SUBMITTED).increment(1);
        info!(
            target = "application::jobs::submit",
            job_id = %job_id,
            fps_override = options.fps.unwrap_or_default(),
            size_override = options.size.is_some(),
            "render job accepted"
        );

        spawn_render(
            self.pipeline.clone(),
            RenderJobRequest {
                job_id,
                design,
                options,
            },
        );

        Ok(job)
    }

    pub fn status(&self, id: &str) -> Result<RenderJob, AppError> {
        self.registry.get(id).ok_or(AppError::NotFound)
    }

    pub fn list(&self) -> Vec<RenderJob> {
        self.registry.list()
    }
}

/// `null`, `false`, `0` and `""` carry no design.
fn is_blank(design: &serde_json::Value) -> bool {
    match design {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(flag) => !flag,
        serde_json::Value::Number(number) => number.as_f64() == Some(0.0),
        serde_json::Value::String(text) => text.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
    }
}

/// Spawn the pipeline for one job behind a supervising task.
///
/// The pipeline records its own failures; the supervisor only catches a
/// panic or abort of the render task and marks the job failed.
pub fn spawn_render(pipeline: Arc<RenderPipeline>, request: RenderJobRequest) -> JoinHandle<()> {
    let job_id = request.job_id.clone();
    let registry = pipeline.registry().clone();
    let render = tokio::spawn(async move { pipeline.run(request).await });

    tokio::spawn(async move {
        if let Err(join_error) = render.await {
            error!(
                target = "application::jobs::submit",
                job_id = %job_id,
                error = %join_error,
                "render task aborted"
            );
            registry.update(
                &job_id,
                JobUpdate::failed(format!("render task aborted: {join_error}")),
            );
        }
    })
}
