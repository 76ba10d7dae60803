// Error taxonomy.
//
// LoadError and InitializationError only happen at startup. CheckError is
// what a single check can end in; each variant maps to one HTTP status.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::model::provider::ModelKind;

/// Why a single capability could not be constructed.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The model is not installed. This is the only case that triggers fallback.
    #[error("{kind} model not installed ({} is missing)", path.display())]
    Unavailable { kind: ModelKind, path: PathBuf },

    /// The model is installed but could not be loaded.
    #[error("{kind} model failed to load: {source:#}")]
    Failed {
        kind: ModelKind,
        source: anyhow::Error,
    },
}

/// Neither capability could be constructed. Fatal at startup.
#[derive(Debug, Error)]
#[error("no usable NSFW model: {}", join_causes(.causes))]
pub struct InitializationError {
    pub causes: Vec<LoadError>,
}

fn join_causes(causes: &[LoadError]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The underlying capability failed on this input. Carries its message as-is.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct InferenceError(pub String);

impl From<anyhow::Error> for InferenceError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

/// Terminal outcome of a failed check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Model not loaded")]
    NotReady,
    #[error("Missing file_path")]
    MissingFilePath,
    #[error("File not found")]
    NotFound,
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl CheckError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingFilePath => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        crate::web::api_error(self.status(), &self.to_string())
    }
}
