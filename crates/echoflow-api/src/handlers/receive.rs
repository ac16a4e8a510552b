//! Video upload handler.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use tracing::{info, warn};

use echoflow_models::{EjectionReport, RequestId};
use echoflow_pipeline::Upload;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

/// `POST /receive-video`: run the whole pipeline on one uploaded video.
///
/// A request without a non-empty `video` part, including one that is not
/// multipart at all, is rejected before anything touches the filesystem.
pub async fn receive_video(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<EjectionReport>> {
    let request_id = request_id.map(|Extension(id)| id).unwrap_or_default();

    let upload = match multipart {
        Ok(multipart) => read_video_field(multipart).await?,
        Err(rejection) => {
            warn!(request_id = %request_id, error = %rejection, "Request is not a multipart upload");
            None
        }
    };

    // An absent part becomes an empty upload so the pipeline rejects it
    // and counts the failure.
    let upload = upload.unwrap_or_else(|| Upload::new("", Vec::new()));
    if !upload.is_empty() {
        metrics::record_upload_bytes(upload.bytes.len());
        info!(
            request_id = %request_id,
            file_name = %upload.file_name,
            bytes = upload.bytes.len(),
            "Received video file"
        );
    } else {
        warn!(request_id = %request_id, "No files were uploaded");
    }

    let report = state.pipeline.run(&request_id, upload).await?;
    Ok(Json(report))
}

/// Read the first `video` part, skipping any other parts.
async fn read_video_field(mut multipart: Multipart) -> ApiResult<Option<Upload>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some(Upload::new(file_name, bytes)));
    }

    Ok(None)
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
