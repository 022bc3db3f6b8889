use crate::application::jobs::RenderJobService;

#[derive(Clone)]
pub struct ApiState {
    pub jobs: RenderJobService,
    /// Origin prepended to artifact paths when building absolute URLs.
    pub public_base_url: String,
}
