// Model layer: one of two NudeNet capabilities behind a single provider.
//
// The ImageClassifier and RegionDetector traits define the capability
// contracts. ModelProvider picks whichever one is installed at startup
// (classifier first, detector as the fallback) and tags every inference
// result with the kind that produced it.

pub mod classifier;
pub mod detector;
pub mod download;
pub mod provider;
pub mod traits;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use ort::session::Session;

/// Build an ONNX Runtime session from a model file.
pub(crate) fn open_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()
        .context("Failed to create ONNX session builder")?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
    Ok(session)
}

/// Lock a session. A panic inside an earlier inference poisons the mutex but
/// leaves the session itself usable, so take it back rather than failing
/// every later request.
pub(crate) fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
