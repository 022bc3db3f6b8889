use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;
use montage::application::jobs::{
    JobRegistry, RenderJobService, RetentionPolicy, sweep_once,
};
use montage::application::render::{
    CompositionMetadata, EncodeRequest, OutputFormat, ProgressListener, ProjectHandle,
    RenderError, RenderInputs, RenderJobRequest, RenderPipeline, RenderPipelineConfig, Renderer,
};
use montage::infra::{artifacts::ArtifactStorage, telemetry};
use montage_api_types::{JobStatus, RenderOptions};
use serde_json::json;
use tempfile::TempDir;

/// Succeeds for every design except those stating a zero-length duration.
struct PickyRenderer;

#[async_trait]
impl Renderer for PickyRenderer {
    async fn compile(&self, entry_point: &Path) -> Result<ProjectHandle, RenderError> {
        Ok(ProjectHandle::new(entry_point))
    }

    async fn resolve_composition(
        &self,
        _project: &ProjectHandle,
        _composition: &str,
        _inputs: &RenderInputs,
    ) -> Result<CompositionMetadata, RenderError> {
        Ok(CompositionMetadata {
            width: 640,
            height: 360,
            fps: 24,
            duration_in_frames: 1,
        })
    }

    async fn encode(
        &self,
        _project: &ProjectHandle,
        request: &EncodeRequest,
        inputs: &RenderInputs,
        progress: &dyn ProgressListener,
    ) -> Result<(), RenderError> {
        progress.report(0.5);
        if inputs.design.duration == Some(0.0) {
            return Err(RenderError::Encode {
                message: "nothing to encode".to_string(),
            });
        }
        tokio::fs::write(&request.output, b"mp4")
            .await
            .map_err(|err| RenderError::Encode {
                message: err.to_string(),
            })
    }
}

#[tokio::test]
async fn render_lifecycle_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let dir = TempDir::new().expect("temp dir");
    let registry = JobRegistry::new();
    let pipeline = Arc::new(RenderPipeline::new(
        registry.clone(),
        Arc::new(PickyRenderer),
        Arc::new(ArtifactStorage::new(dir.path().to_path_buf()).expect("storage")),
        RenderPipelineConfig {
            entry_point: "remotion/Root.tsx".into(),
            composition: "VideoComposition".to_string(),
            format: OutputFormat::default(),
            max_concurrent_renders: 1,
        },
    ));

    // Submission goes through the service so the submit counter fires.
    let service = RenderJobService::new(pipeline.clone());
    let submitted = service
        .submit(Some(json!({})), RenderOptions::default())
        .expect("submit");

    registry.create("failing").expect("create");
    pipeline
        .run(RenderJobRequest {
            job_id: "failing".to_string(),
            design: json!({"duration": 0}),
            options: RenderOptions::default(),
        })
        .await;
    assert_eq!(
        registry.get("failing").map(|job| job.status),
        Some(JobStatus::Failed)
    );

    for _ in 0..200 {
        if registry
            .get(&submitted.id)
            .is_some_and(|job| job.status.is_terminal())
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        registry.get(&submitted.id).map(|job| job.status),
        Some(JobStatus::Completed)
    );

    let evicted = sweep_once(
        &registry,
        &RetentionPolicy {
            retention: Duration::ZERO,
            sweep_interval: Duration::from_secs(60),
        },
    );
    assert_eq!(evicted, 2);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "montage_render_jobs_submitted_total",
        "montage_render_jobs_completed_total",
        "montage_render_jobs_failed_total",
        "montage_render_jobs_active",
        "montage_render_duration_ms",
        "montage_render_jobs_evicted_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
