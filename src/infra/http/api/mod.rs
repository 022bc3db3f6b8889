pub mod error;
pub mod handlers;
pub mod state;

pub use state::ApiState;

use axum::{Router, routing::get};

use crate::infra::http::RouterState;

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route(
            "/api/render",
            get(handlers::list_renders).post(handlers::submit_render),
        )
        .route("/api/render/{id}", get(handlers::get_render))
        .with_state(state)
}
