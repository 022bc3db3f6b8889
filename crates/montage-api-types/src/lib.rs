//! Request and response shapes for the montage render-job API.
//!
//! The server and its integration tests share these types so the wire format
//! stays in one place.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a render job.
///
/// Transitions are one-directional: `Pending → Processing → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Per-request overrides applied on top of the resolved composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub size: Option<RenderSize>,
    pub fps: Option<u32>,
}

/// Body of `POST /api/render`.
///
/// `design` is kept as raw JSON here; its shape is checked by the render
/// pipeline, not at submission time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitRenderRequest {
    pub design: Option<serde_json::Value>,
    pub options: Option<RenderOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedRender {
    pub id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRenderResponse {
    pub render: SubmittedRender,
}

/// Snapshot of one job as reported to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobView {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Absolute location of the artifact, present alongside `output_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStatusResponse {
    pub render: RenderJobView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderListResponse {
    pub renders: Vec<RenderJobView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_upper_case_on_the_wire() {
        let json = serde_json::to_string(&JobStatus::Processing).expect("serialize");
        assert_eq!(json, "\"PROCESSING\"");
        assert_eq!(JobStatus::try_from("FAILED"), Ok(JobStatus::Failed));
        assert!(JobStatus::try_from("failed").is_err());
    }

    #[test]
    fn view_omits_absent_output_and_error() {
        let view = RenderJobView {
            id: "abc".to_string(),
            status: JobStatus::Pending,
            progress: 0,
            output_path: None,
            url: None,
            error: None,
        };
        let value = serde_json::to_value(&view).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"id": "abc", "status": "PENDING", "progress": 0})
        );
    }

    #[test]
    fn submit_request_tolerates_missing_fields() {
        let request: SubmitRenderRequest = serde_json::from_str("{}").expect("deserialize");
        assert!(request.design.is_none());
        assert!(request.options.is_none());

        let request: SubmitRenderRequest =
            serde_json::from_str(r#"{"design": {}, "options": {"fps": 24}}"#)
                .expect("deserialize");
        assert!(request.design.is_some());
        assert_eq!(request.options.and_then(|o| o.fps), Some(24));
    }
}
