use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use tokio_util::io::ReaderStream;

use crate::{
    application::error::HttpError,
    infra::artifacts::{ArtifactStorage, ArtifactStorageError},
};

use super::RouterState;

const PARTIAL_MARKER: &str = ".partial.";

#[derive(Clone)]
pub struct HttpState {
    pub artifacts: Arc<ArtifactStorage>,
}

pub fn build_public_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/_health", get(health))
        .route("/renders/{*path}", get(serve_artifact))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn serve_artifact(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    if path.contains(PARTIAL_MARKER) {
        return artifact_not_found(&path);
    }

    match state.artifacts.open(&path).await {
        Ok((file, length)) => build_artifact_response(&path, file, length),
        Err(ArtifactStorageError::InvalidPath) => artifact_not_found(&path),
        Err(ArtifactStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            artifact_not_found(&path)
        }
        Err(err) => HttpError::from_error(
            "infra::http::public::serve_artifact",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read render output",
            &err,
        )
        .into_response(),
    }
}

fn artifact_not_found(path: &str) -> Response {
    HttpError::new(
        "infra::http::public::serve_artifact",
        StatusCode::NOT_FOUND,
        "Render output not found",
        format!("no artifact at `{path}`"),
    )
    .into_response()
}

fn build_artifact_response(path: &str, file: tokio::fs::File, length: u64) -> Response {
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
