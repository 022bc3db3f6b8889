//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CliArgs, Command, LoggingOverrides, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "montage";
const ENV_PREFIX: &str = "MONTAGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3002;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 16 * 1024 * 1024;
pub(crate) const DEFAULT_RENDER_CLI_PATH: &str = "montage-renderer";
pub(crate) const DEFAULT_ENTRY_POINT: &str = "remotion/Root.tsx";
pub(crate) const DEFAULT_COMPOSITION: &str = "VideoComposition";
pub(crate) const DEFAULT_WORK_DIR: &str = "/tmp/montage";
pub(crate) const DEFAULT_OUTPUT_DIR: &str = "public/renders";
pub(crate) const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3002";
const DEFAULT_VIDEO_CODEC: &str = "h264";
const DEFAULT_AUDIO_CODEC: &str = "mp3";
const DEFAULT_AUDIO_BITRATE: &str = "320k";
const DEFAULT_MAX_CONCURRENT_RENDERS: u64 = 2;
const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_request_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub cli_path: PathBuf,
    pub entry_point: PathBuf,
    pub composition: String,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Origin without a trailing slash.
    pub public_base_url: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub max_concurrent_renders: NonZeroU32,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => {
            raw.apply_render_overrides(&args.overrides);
            raw.apply_logging_overrides(&args.logging);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    jobs: RawJobsSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    cli_path: Option<PathBuf>,
    entry_point: Option<PathBuf>,
    composition: Option<String>,
    work_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    public_base_url: Option<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    audio_bitrate: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    max_concurrent_renders: Option<u64>,
    retention_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(limit);
        }
        if let Some(url) = overrides.public_base_url.as_ref() {
            self.render.public_base_url = Some(url.clone());
        }
        if let Some(value) = overrides.jobs_max_concurrent_renders {
            self.jobs.max_concurrent_renders = Some(value.into());
        }
        if let Some(seconds) = overrides.jobs_retention_seconds {
            self.jobs.retention_seconds = Some(seconds);
        }

        self.apply_render_overrides(&overrides.render);
        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.cli_path.as_ref() {
            self.render.cli_path = Some(path.clone());
        }
        if let Some(path) = overrides.entry_point.as_ref() {
            self.render.entry_point = Some(path.clone());
        }
        if let Some(name) = overrides.composition.as_ref() {
            self.render.composition = Some(name.clone());
        }
        if let Some(dir) = overrides.work_dir.as_ref() {
            self.render.work_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.render.output_dir = Some(dir.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            jobs,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            jobs: build_jobs_settings(jobs)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_request_bytes = server
        .max_request_bytes
        .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    if max_request_bytes == 0 {
        return Err(LoadError::invalid(
            "server.max_request_bytes",
            "must be greater than zero",
        ));
    }
    let max_request_bytes = usize::try_from(max_request_bytes).map_err(|_| {
        LoadError::invalid(
            "server.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_request_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let cli_path = non_empty_path(render.cli_path, DEFAULT_RENDER_CLI_PATH, "render.cli_path")?;
    let entry_point = non_empty_path(
        render.entry_point,
        DEFAULT_ENTRY_POINT,
        "render.entry_point",
    )?;
    let work_dir = non_empty_path(render.work_dir, DEFAULT_WORK_DIR, "render.work_dir")?;
    let output_dir = non_empty_path(render.output_dir, DEFAULT_OUTPUT_DIR, "render.output_dir")?;

    let composition = non_empty_string(
        render.composition,
        DEFAULT_COMPOSITION,
        "render.composition",
    )?;

    let public_base_url = non_empty_string(
        render.public_base_url,
        DEFAULT_PUBLIC_BASE_URL,
        "render.public_base_url",
    )?;
    if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
        return Err(LoadError::invalid(
            "render.public_base_url",
            "must start with http:// or https://",
        ));
    }
    let public_base_url = public_base_url.trim_end_matches('/').to_string();

    Ok(RenderSettings {
        cli_path,
        entry_point,
        composition,
        work_dir,
        output_dir,
        public_base_url,
        video_codec: non_empty_string(
            render.video_codec,
            DEFAULT_VIDEO_CODEC,
            "render.video_codec",
        )?,
        audio_codec: non_empty_string(
            render.audio_codec,
            DEFAULT_AUDIO_CODEC,
            "render.audio_codec",
        )?,
        audio_bitrate: non_empty_string(
            render.audio_bitrate,
            DEFAULT_AUDIO_BITRATE,
            "render.audio_bitrate",
        )?,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let max_concurrent_renders = non_zero_u32(
        jobs.max_concurrent_renders
            .unwrap_or(DEFAULT_MAX_CONCURRENT_RENDERS),
        "jobs.max_concurrent_renders",
    )?;

    let retention_seconds = jobs.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECS);

    let sweep_interval_seconds = jobs
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if sweep_interval_seconds == 0 {
        return Err(LoadError::invalid(
            "jobs.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(JobsSettings {
        max_concurrent_renders,
        retention: Duration::from_secs(retention_seconds),
        sweep_interval: Duration::from_secs(sweep_interval_seconds),
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn non_empty_string(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests;
