use std::{process, sync::Arc};

use montage::{
    application::{
        error::AppError,
        jobs::{JobRegistry, RenderJobService, RetentionPolicy, spawn_retention_sweeper},
        render::{OutputFormat, RenderJobRequest, RenderPipeline, RenderPipelineConfig},
    },
    config,
    infra::{
        artifacts::ArtifactStorage,
        error::InfraError,
        http::{self, ApiState, HttpState, RouterState},
        renderer::CommandRenderer,
        telemetry,
    },
};
use montage_api_types::{RenderOptions, RenderSize};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

struct ApplicationContext {
    registry: JobRegistry,
    pipeline: Arc<RenderPipeline>,
    artifacts: Arc<ArtifactStorage>,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let render = &settings.render;

    let renderer = CommandRenderer::new(render.cli_path.clone(), render.work_dir.clone())
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let artifacts = Arc::new(
        ArtifactStorage::new(render.output_dir.clone())
            .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let registry = JobRegistry::new();
    let pipeline = Arc::new(RenderPipeline::new(
        registry.clone(),
        Arc::new(renderer),
        artifacts.clone(),
        RenderPipelineConfig {
            entry_point: render.entry_point.clone(),
            composition: render.composition.clone(),
            format: OutputFormat {
                video_codec: render.video_codec.clone(),
                audio_codec: render.audio_codec.clone(),
                audio_bitrate: render.audio_bitrate.clone(),
            },
            max_concurrent_renders: settings.jobs.max_concurrent_renders.get() as usize,
        },
    ));

    info!(
        target = "montage::startup",
        renderer = %render.cli_path.display(),
        composition = %render.composition,
        output_dir = %artifacts.root().display(),
        max_concurrent_renders = settings.jobs.max_concurrent_renders.get(),
        "render pipeline configured"
    );

    Ok(ApplicationContext {
        registry,
        pipeline,
        artifacts,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let sweeper = spawn_retention_sweeper(
        app.registry.clone(),
        RetentionPolicy {
            retention: settings.jobs.retention,
            sweep_interval: settings.jobs.sweep_interval,
        },
    );

    let router_state = RouterState {
        http: HttpState {
            artifacts: app.artifacts.clone(),
        },
        api: ApiState {
            jobs: RenderJobService::new(app.pipeline.clone()),
            public_base_url: settings.render.public_base_url.clone(),
        },
    };

    let result = serve_http(&settings, router_state).await;

    app.pipeline.close();
    sweeper.abort();
    let _ = sweeper.await;

    result
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.server.max_request_bytes);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "montage::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return flatten_server_result(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target = "montage::shutdown",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested; draining connections"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!(
                target = "montage::shutdown",
                "graceful shutdown timed out; dropping open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "montage::shutdown", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "montage::shutdown", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let raw = tokio::fs::read(&args.design)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let design: serde_json::Value = serde_json::from_slice(&raw).map_err(|err| {
        AppError::validation(format!(
            "failed to parse design file `{}`: {err}",
            args.design.display()
        ))
    })?;

    let size = match (args.width, args.height) {
        (Some(width), Some(height)) => Some(RenderSize { width, height }),
        _ => None,
    };
    let options = RenderOptions {
        size,
        fps: args.fps,
    };

    let app = build_application_context(&settings)?;
    let job_id = Uuid::new_v4().simple().to_string();
    app.registry.create(&job_id)?;

    info!(
        target = "montage::render",
        job_id = %job_id,
        design = %args.design.display(),
        "rendering design"
    );

    app.pipeline
        .run(RenderJobRequest {
            job_id: job_id.clone(),
            design,
            options,
        })
        .await;

    let job = app
        .registry
        .get(&job_id)
        .ok_or_else(|| AppError::unexpected("render job vanished from the registry"))?;
    let view = job.view(&settings.render.public_base_url);
    let rendered = serde_json::to_string_pretty(&view)
        .map_err(|err| AppError::unexpected(format!("failed to encode job record: {err}")))?;
    println!("{rendered}");

    match job.error {
        Some(error) if view.status == montage_api_types::JobStatus::Failed => {
            Err(AppError::unexpected(format!("render failed: {error}")))
        }
        _ => Ok(()),
    }
}
