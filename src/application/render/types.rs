use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::design::Design;

/// Opaque reference to a compiled renderer project (typically a bundle directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    location: PathBuf,
}

impl ProjectHandle {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

/// Base geometry and timing the renderer reports for a named composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_in_frames: u32,
}

/// Fully resolved composition handed to the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_in_frames: u32,
}

/// Codec settings for the muxed output: one video stream and one audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            audio_codec: "mp3".to_string(),
            audio_bitrate: "320k".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub composition: CompositionSpec,
    pub format: OutputFormat,
    pub output: PathBuf,
}

/// Props forwarded to the renderer's project for both resolution and encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderInputs {
    pub design: Design,
}

/// Receives encode progress as a fraction in `[0, 1]`.
///
/// Implementations must not block; they run on the encoder's reporting path.
pub trait ProgressListener: Send + Sync {
    fn report(&self, fraction: f64);
}

/// Failures surfaced by an external renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("project compilation failed: {message}")]
    Compile { message: String },
    #[error("composition `{composition}` could not be resolved: {message}")]
    Composition {
        composition: String,
        message: String,
    },
    #[error("encoding failed: {message}")]
    Encode { message: String },
    #[error("renderer unavailable: {message}")]
    Unavailable { message: String },
}

/// External renderer contract. The orchestrator never composes or encodes
/// frames itself; everything media-related happens behind this trait.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Build a renderable project from the static entry point.
    async fn compile(&self, entry_point: &Path) -> Result<ProjectHandle, RenderError>;

    async fn resolve_composition(
        &self,
        project: &ProjectHandle,
        composition: &str,
        inputs: &RenderInputs,
    ) -> Result<CompositionMetadata, RenderError>;

    /// Encode the composition into `request.output`, reporting progress through
    /// `progress`. Reported fractions never go backwards.
    async fn encode(
        &self,
        project: &ProjectHandle,
        request: &EncodeRequest,
        inputs: &RenderInputs,
        progress: &dyn ProgressListener,
    ) -> Result<(), RenderError>;
}
