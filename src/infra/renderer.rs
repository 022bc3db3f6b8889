//! Renderer backed by an external command-line tool.

use std::{
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::render::{
    CompositionMetadata, EncodeRequest, ProgressListener, ProjectHandle, RenderError,
    RenderInputs, Renderer,
};

const TARGET: &str = "infra::renderer";
const PROGRESS_PREFIX: &str = "progress ";

/// Drives a renderer executable through `compile`, `resolve` and `encode`
/// subcommands. Encoding progress is read from stdout as `progress <fraction>`
/// lines; anything else on stdout is logged at debug level.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    cli_path: PathBuf,
    work_dir: PathBuf,
}

impl CommandRenderer {
    pub fn new(cli_path: PathBuf, work_dir: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(work_dir.join("bundles"))?;
        Ok(Self { cli_path, work_dir })
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(&self.cli_path);
        command
            .arg(subcommand)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn write_props(&self, inputs: &RenderInputs) -> Result<NamedTempFile, io::Error> {
        let mut props = tempfile::Builder::new()
            .prefix("props-")
            .suffix(".json")
            .tempfile_in(&self.work_dir)?;
        serde_json::to_writer(&mut props, inputs).map_err(io::Error::other)?;
        props.flush()?;
        Ok(props)
    }

    fn unavailable(&self, err: io::Error) -> RenderError {
        let message = if err.kind() == ErrorKind::NotFound {
            format!("{} not found", self.cli_path.display())
        } else {
            err.to_string()
        };
        RenderError::Unavailable { message }
    }
}

fn cli_failure(exit_code: Option<i32>, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    match (exit_code, stderr.is_empty()) {
        (Some(code), true) => format!("renderer exited with status {code}"),
        (Some(code), false) => format!("renderer exited with status {code}: {stderr}"),
        (None, true) => "renderer terminated by signal".to_string(),
        (None, false) => format!("renderer terminated by signal: {stderr}"),
    }
}

/// Parse one stdout line from `encode`; `None` for lines that are not
/// progress reports.
fn parse_progress_line(line: &str) -> Option<f64> {
    line.trim()
        .strip_prefix(PROGRESS_PREFIX)
        .and_then(|value| value.trim().parse::<f64>().ok())
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn compile(&self, entry_point: &Path) -> Result<ProjectHandle, RenderError> {
        let started_at = Instant::now();
        let out_dir = self
            .work_dir
            .join("bundles")
            .join(Uuid::new_v4().simple().to_string());

        let output = self
            .command("compile")
            .arg("--entry")
            .arg(entry_point)
            .arg("--out-dir")
            .arg(&out_dir)
            .output()
            .await
            .map_err(|err| self.unavailable(err))?;

        if !output.status.success() {
            let message = cli_failure(output.status.code(), &output.stderr);
            warn!(
                target = TARGET,
                op = "compile",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %message,
                "renderer compile failed"
            );
            return Err(RenderError::Compile { message });
        }

        info!(
            target = TARGET,
            op = "compile",
            entry_point = %entry_point.display(),
            bundle = %out_dir.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "project compiled"
        );
        Ok(ProjectHandle::new(out_dir))
    }

    async fn resolve_composition(
        &self,
        project: &ProjectHandle,
        composition: &str,
        inputs: &RenderInputs,
    ) -> Result<CompositionMetadata, RenderError> {
        let composition_error = |message: String| RenderError::Composition {
            composition: composition.to_string(),
            message,
        };
        let props = self
            .write_props(inputs)
            .map_err(|err| composition_error(format!("failed to write props: {err}")))?;

        let output = self
            .command("resolve")
            .arg("--bundle")
            .arg(project.location())
            .arg("--composition")
            .arg(composition)
            .arg("--props")
            .arg(props.path())
            .output()
            .await
            .map_err(|err| self.unavailable(err))?;

        if !output.status.success() {
            return Err(composition_error(cli_failure(
                output.status.code(),
                &output.stderr,
            )));
        }

        serde_json::from_slice::<CompositionMetadata>(&output.stdout)
            .map_err(|err| composition_error(format!("malformed composition metadata: {err}")))
    }

    async fn encode(
        &self,
        project: &ProjectHandle,
        request: &EncodeRequest,
        inputs: &RenderInputs,
        progress: &dyn ProgressListener,
    ) -> Result<(), RenderError> {
        let started_at = Instant::now();
        let props = self.write_props(inputs).map_err(|err| RenderError::Encode {
            message: format!("failed to write props: {err}"),
        })?;
        let spec = &request.composition;

        let mut child = self
            .command("encode")
            .arg("--bundle")
            .arg(project.location())
            .arg("--composition")
            .arg(&spec.name)
            .arg("--props")
            .arg(props.path())
            .arg("--width")
            .arg(spec.width.to_string())
            .arg("--height")
            .arg(spec.height.to_string())
            .arg("--fps")
            .arg(spec.fps.to_string())
            .arg("--frames")
            .arg(spec.duration_in_frames.to_string())
            .arg("--codec")
            .arg(&request.format.video_codec)
            .arg("--audio-codec")
            .arg(&request.format.audio_codec)
            .arg("--audio-bitrate")
            .arg(&request.format.audio_bitrate)
            .arg("--output")
            .arg(&request.output)
            .spawn()
            .map_err(|err| self.unavailable(err))?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(RenderError::Encode {
                message: "renderer output streams unavailable".to_string(),
            });
        };

        let read_progress = async {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Some(line) = lines.next_segment().await? {
                let line = String::from_utf8_lossy(&line);
                match parse_progress_line(&line) {
                    Some(fraction) => progress.report(fraction),
                    None => debug!(target = TARGET, op = "encode", line = %line, "renderer output"),
                }
            }
            Ok::<_, io::Error>(())
        };
        let read_stderr = async {
            let mut buffer = Vec::new();
            stderr.read_to_end(&mut buffer).await?;
            Ok::<_, io::Error>(buffer)
        };

        let (progress_result, stderr_result) = tokio::join!(read_progress, read_stderr);
        let status = child.wait().await.map_err(|err| RenderError::Encode {
            message: format!("failed to wait for renderer: {err}"),
        })?;
        let stderr = stderr_result.unwrap_or_default();

        if !status.success() {
            let message = cli_failure(status.code(), &stderr);
            warn!(
                target = TARGET,
                op = "encode",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %message,
                "renderer encode failed"
            );
            return Err(RenderError::Encode { message });
        }
        if let Err(err) = progress_result {
            warn!(
                target = TARGET,
                op = "encode",
                error = %err,
                "failed to read renderer progress"
            );
        }

        info!(
            target = TARGET,
            op = "encode",
            output = %request.output.display(),
            frames = spec.duration_in_frames,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "composition encoded"
        );
        Ok(())
    }
}
