mod registry;
mod retention;
mod service;

pub use registry::{JobRegistry, RegistryError};
pub use retention::{RetentionPolicy, spawn_retention_sweeper, sweep_once};
pub use service::{RenderJobService, spawn_render};
