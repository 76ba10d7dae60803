// POST /check: classify one image file by path.
//
// Body: {"file_path": "<path>"}
// Order of checks: model loaded (503), file_path present (400),
// file exists (404), inference (500), then 200 with the verdict.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::check::check_file;
use crate::error::CheckError;
use crate::web::AppState;

#[derive(Deserialize)]
pub struct CheckRequest {
    pub file_path: Option<String>,
}

pub async fn check_image(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(provider) = state.provider.as_ref() else {
        return CheckError::NotReady.into_response();
    };

    let Some(file_path) = file_path_from_body(&body) else {
        return CheckError::MissingFilePath.into_response();
    };

    match check_file(provider, &state.policy, &file_path).await {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Pull a non-empty `file_path` out of the body. A body that isn't a JSON
/// object, or whose `file_path` isn't a string, counts as missing.
fn file_path_from_body(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<CheckRequest>(body)
        .ok()?
        .file_path
        .filter(|p| !p.is_empty())
}
