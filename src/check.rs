// The resolve → infer → decide steps of a single check.
//
// Shared by POST /check and the `check` subcommand. Readiness and request
// validation happen before this, in the caller.

use std::path::Path;

use tracing::{error, info};

use crate::error::CheckError;
use crate::model::provider::ModelProvider;
use crate::policy::{Verdict, VerdictPolicy};

/// Check one image file. The model is not touched unless the file exists.
pub async fn check_file(
    provider: &ModelProvider,
    policy: &VerdictPolicy,
    file_path: &str,
) -> Result<Verdict, CheckError> {
    let path = Path::new(file_path);

    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(CheckError::NotFound);
    }

    info!(path = %file_path, "Checking image");

    let raw = provider.infer(path).await.map_err(|e| {
        error!(path = %file_path, error = %e, "Inference failed");
        e
    })?;

    let kind = raw.kind();
    let verdict = policy.decide(raw);
    info!(
        path = %file_path,
        %kind,
        is_nsfw = verdict.is_nsfw,
        probability = verdict.probability,
        "Check complete"
    );

    Ok(verdict)
}
