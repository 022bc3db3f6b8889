//! Render orchestration.
//!
//! The pipeline never touches frames or codecs. It compiles a project, asks
//! the renderer about the composition, and hands encoding off through the
//! [`Renderer`] trait, translating whatever happens into job state.

mod pipeline;
mod progress;
mod types;

pub use pipeline::{
    RenderJobRequest, RenderPipeline, RenderPipelineConfig, RenderPipelineError,
    output_composition,
};
pub use progress::{ProgressReporter, encode_progress};
pub use types::{
    CompositionMetadata, CompositionSpec, EncodeRequest, OutputFormat, ProgressListener,
    ProjectHandle, RenderError, RenderInputs, Renderer,
};
