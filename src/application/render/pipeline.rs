//! Staged render pipeline: drives one job from `PENDING` to a terminal state.
//!
//! Stages run strictly in order (decode, compile, resolve, geometry, encode)
//! and every failure is converted into the job's `FAILED` state here, so
//! nothing escapes to the task that launched the pipeline.

use std::{path::PathBuf, sync::Arc, time::Instant};

use metrics::{counter, gauge, histogram};
use montage_api_types::RenderOptions;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{error, info, warn};

use crate::{
    application::jobs::JobRegistry,
    domain::{
        design::{DEFAULT_FPS, Design, frames_for},
        error::DomainError,
        jobs::JobUpdate,
    },
    infra::artifacts::{ArtifactStorage, ArtifactStorageError},
};

use super::{
    progress::{COMPOSITION_RESOLVED, PROCESSING_STARTED, PROJECT_COMPILED, ProgressReporter},
    types::{
        CompositionMetadata, CompositionSpec, EncodeRequest, OutputFormat, ProjectHandle,
        RenderError, RenderInputs, Renderer,
    },
};

pub(crate) const METRIC_JOBS_COMPLETED: &str = "montage_render_jobs_completed_total";
pub(crate) const METRIC_JOBS_FAILED: &str = "montage_render_jobs_failed_total";
pub(crate) const METRIC_JOBS_ACTIVE: &str = "montage_render_jobs_active";
pub(crate) const METRIC_RENDER_DURATION_MS: &str = "montage_render_duration_ms";

const TARGET: &str = "application::render::pipeline";

#[derive(Debug, Error)]
pub enum RenderPipelineError {
    #[error(transparent)]
    Design(#[from] DomainError),
    #[error(transparent)]
    Renderer(#[from] RenderError),
    #[error("artifact storage failed: {0}")]
    Storage(#[from] ArtifactStorageError),
    #[error("render slot unavailable: scheduler is shutting down")]
    SchedulerClosed,
}

/// Static settings shared by every job the pipeline runs.
#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    pub entry_point: PathBuf,
    pub composition: String,
    pub format: OutputFormat,
    pub max_concurrent_renders: usize,
}

/// One unit of work handed to the pipeline.
#[derive(Debug, Clone)]
pub struct RenderJobRequest {
    pub job_id: String,
    pub design: serde_json::Value,
    pub options: RenderOptions,
}

/// Keeps the active-render gauge and duration histogram balanced, including
/// when the render future unwinds.
struct ActiveRender {
    started_at: Instant,
}

impl ActiveRender {
    fn start() -> Self {
        gauge!(METRIC_JOBS_ACTIVE).increment(1.0);
        Self {
            started_at: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

impl Drop for ActiveRender {
    fn drop(&mut self) {
        gauge!(METRIC_JOBS_ACTIVE).decrement(1.0);
        histogram!(METRIC_RENDER_DURATION_MS)
            .record(self.started_at.elapsed().as_secs_f64() * 1000.0);
    }
}

pub struct RenderPipeline {
    registry: JobRegistry,
    renderer: Arc<dyn Renderer>,
    artifacts: Arc<ArtifactStorage>,
    config: RenderPipelineConfig,
    slots: Arc<Semaphore>,
    // The bundle depends only on the entry point, so one compile serves every job.
    project: OnceCell<ProjectHandle>,
}

impl RenderPipeline {
    pub fn new(
        registry: JobRegistry,
        renderer: Arc<dyn Renderer>,
        artifacts: Arc<ArtifactStorage>,
        config: RenderPipelineConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_renders.max(1)));
        Self {
            registry,
            renderer,
            artifacts,
            config,
            slots,
            project: OnceCell::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Stop handing out render slots. Jobs still waiting for one fail;
    /// renders already running finish normally.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Run the job to completion. The outcome is recorded in the registry;
    /// this never returns an error.
    pub async fn run(&self, request: RenderJobRequest) {
        let job_id = request.job_id.as_str();

        // The job stays PENDING until a render slot frees up.
        let _slot = match self.slots.clone().acquire_owned().await {
            Ok(slot) => slot,
            Err(_) => {
                self.fail(job_id, &RenderPipelineError::SchedulerClosed);
                return;
            }
        };

        let active = ActiveRender::start();
        self.registry
            .update(job_id, JobUpdate::processing(PROCESSING_STARTED));
        info!(target = TARGET, job_id = %job_id, "render started");

        match self.execute(&request).await {
            Ok(output_path) => {
                self.registry
                    .update(job_id, JobUpdate::completed(output_path.clone()));
                counter!(METRIC_JOBS_COMPLETED).increment(1);
                info!(
                    target = TARGET,
                    job_id = %job_id,
                    output_path = %output_path,
                    elapsed_ms = active.elapsed_ms(),
                    "render completed"
                );
            }
            Err(err) => self.fail(job_id, &err),
        }
    }

    fn fail(&self, job_id: &str, err: &RenderPipelineError) {
        let progress = self.registry.get(job_id).map(|job| job.progress);
        error!(
            target = TARGET,
            job_id = %job_id,
            progress = progress.unwrap_or_default(),
            error = %err,
            "render failed"
        );
        self.registry.update(job_id, JobUpdate::failed(err.to_string()));
        counter!(METRIC_JOBS_FAILED).increment(1);
    }

    async fn execute(&self, request: &RenderJobRequest) -> Result<String, RenderPipelineError> {
        let job_id = request.job_id.as_str();
        let inputs = RenderInputs {
            design: Design::from_value(request.design.clone())?,
        };

        let stage_started = Instant::now();
        let project = self
            .project
            .get_or_try_init(|| self.renderer.compile(&self.config.entry_point))
            .await?;
        self.registry
            .update(job_id, JobUpdate::progress(PROJECT_COMPILED));
        info!(
            target = TARGET,
            job_id = %job_id,
            stage = "compile",
            project = %project.location().display(),
            elapsed_ms = stage_started.elapsed().as_millis() as u64,
            "render stage finished"
        );

        let stage_started = Instant::now();
        let metadata = self
            .renderer
            .resolve_composition(project, &self.config.composition, &inputs)
            .await?;
        self.registry
            .update(job_id, JobUpdate::progress(COMPOSITION_RESOLVED));
        info!(
            target = TARGET,
            job_id = %job_id,
            stage = "resolve",
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            elapsed_ms = stage_started.elapsed().as_millis() as u64,
            "render stage finished"
        );

        let composition = output_composition(
            &self.config.composition,
            &metadata,
            &request.options,
            &inputs.design,
        );
        info!(
            target = TARGET,
            job_id = %job_id,
            stage = "geometry",
            width = composition.width,
            height = composition.height,
            fps = composition.fps,
            frames = composition.duration_in_frames,
            duration_ms = inputs.design.effective_duration_ms(),
            stated_duration_ms = inputs.design.duration.unwrap_or_default(),
            "render stage finished"
        );

        let stage_started = Instant::now();
        let target = self.artifacts.prepare(job_id).await?;
        let encode = EncodeRequest {
            composition,
            format: self.config.format.clone(),
            output: target.partial_path.clone(),
        };
        let reporter = ProgressReporter::new(&self.registry, job_id, COMPOSITION_RESOLVED);
        let encoded = self
            .renderer
            .encode(project, &encode, &inputs, &reporter)
            .await;

        if let Err(err) = encoded {
            if let Err(cleanup) = self.artifacts.discard(&target).await {
                warn!(
                    target = TARGET,
                    job_id = %job_id,
                    path = %target.partial_path.display(),
                    error = %cleanup,
                    "failed to remove partial render output"
                );
            }
            return Err(err.into());
        }

        self.artifacts.commit(&target).await?;
        info!(
            target = TARGET,
            job_id = %job_id,
            stage = "encode",
            last_progress = reporter.last(),
            elapsed_ms = stage_started.elapsed().as_millis() as u64,
            "render stage finished"
        );

        Ok(target.public_path)
    }
}

/// Final geometry and frame count. Explicit options beat the resolved
/// composition; the frame count always comes from the design's timeline.
pub fn output_composition(
    name: &str,
    metadata: &CompositionMetadata,
    options: &RenderOptions,
    design: &Design,
) -> CompositionSpec {
    let (width, height) = match options.size {
        Some(size) if size.width > 0 && size.height > 0 => (size.width, size.height),
        _ => (metadata.width, metadata.height),
    };
    let fps = options
        .fps
        .filter(|fps| *fps > 0)
        .or(Some(metadata.fps).filter(|fps| *fps > 0))
        .unwrap_or(DEFAULT_FPS);

    CompositionSpec {
        name: name.to_string(),
        width,
        height,
        fps,
        duration_in_frames: frames_for(design.effective_duration_ms(), fps),
    }
}
