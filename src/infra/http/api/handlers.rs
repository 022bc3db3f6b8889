use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use montage_api_types::{
    RenderListResponse, RenderStatusResponse, SubmitRenderRequest, SubmitRenderResponse,
    SubmittedRender,
};

use super::error::ApiError;
use super::state::ApiState;

/// -------- Render jobs --------
pub async fn submit_render(
    State(state): State<ApiState>,
    payload: Result<Json<SubmitRenderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::bad_request("Invalid render request", Some(rejection.body_text()))
    })?;

    let job = state
        .jobs
        .submit(payload.design, payload.options.unwrap_or_default())
        .map_err(ApiError::from)?;

    Ok(Json(SubmitRenderResponse {
        render: SubmittedRender {
            id: job.id,
            status: job.status,
        },
    }))
}

pub async fn get_render(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.jobs.status(&id).map_err(ApiError::from)?;
    Ok(Json(RenderStatusResponse {
        render: job.view(&state.public_base_url),
    }))
}

pub async fn list_renders(State(state): State<ApiState>) -> impl IntoResponse {
    let renders = state
        .jobs
        .list()
        .into_iter()
        .map(|job| job.view(&state.public_base_url))
        .collect();
    Json(RenderListResponse { renders })
}
