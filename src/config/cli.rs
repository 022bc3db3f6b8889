use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the montage binary.
#[derive(Debug, Parser)]
#[command(name = "montage", version, about = "Montage render-job server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MONTAGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the render-job HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a single design file in-process and print the final job record.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Path to a JSON design document.
    #[arg(value_name = "DESIGN", value_hint = ValueHint::FilePath)]
    pub design: PathBuf,

    /// Override the composition frame rate.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<u32>,

    /// Override the output width; requires --height.
    #[arg(long, value_name = "PIXELS", requires = "height")]
    pub width: Option<u32>,

    /// Override the output height; requires --width.
    #[arg(long, value_name = "PIXELS", requires = "width")]
    pub height: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the renderer executable.
    #[arg(long = "render-cli-path", value_name = "PATH")]
    pub cli_path: Option<PathBuf>,

    /// Override the project entry point handed to the renderer.
    #[arg(long = "render-entry-point", value_name = "PATH")]
    pub entry_point: Option<PathBuf>,

    /// Override the composition rendered for every job.
    #[arg(long = "render-composition", value_name = "NAME")]
    pub composition: Option<String>,

    /// Override the scratch directory for bundles and props files.
    #[arg(long = "render-work-dir", value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Override the directory finished videos are written to.
    #[arg(long = "render-output-dir", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum accepted request body size in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Override the origin used to build absolute artifact URLs.
    #[arg(long = "render-public-base-url", value_name = "URL")]
    pub public_base_url: Option<String>,

    /// Override how many renders may run at once.
    #[arg(long = "jobs-max-concurrent-renders", value_name = "COUNT")]
    pub jobs_max_concurrent_renders: Option<u32>,

    /// Override how long finished jobs stay queryable.
    #[arg(long = "jobs-retention-seconds", value_name = "SECONDS")]
    pub jobs_retention_seconds: Option<u64>,
}
