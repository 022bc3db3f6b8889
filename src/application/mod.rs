//! Application services: job bookkeeping and the render pipeline.

pub mod error;
pub mod jobs;
pub mod render;
