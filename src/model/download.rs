// Model download helper for the NudeNet ONNX models.
//
// Downloads two models from the NudeNet GitHub releases:
// 1. classifier_model.onnx: whole-image safe/unsafe classifier (~80MB)
// 2. 320n.onnx: region detector with 18 body-part labels (~12MB)
//
// Either one alone is enough to serve. Files are stored in a
// platform-appropriate directory (~/.local/share/nsfwd/models/ on Linux).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const CLASSIFIER_MODEL_FILE: &str = "classifier_model.onnx";
pub const DETECTOR_MODEL_FILE: &str = "320n.onnx";

const CLASSIFIER_URL: &str =
    "https://github.com/notAI-tech/NudeNet/releases/download/v0/classifier_model.onnx";
const DETECTOR_URL: &str =
    "https://github.com/notAI-tech/NudeNet/releases/download/v3.4-weights/320n.onnx";

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/nsfwd/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nsfwd")
        .join("models")
}

pub fn classifier_present(dir: &Path) -> bool {
    dir.join(CLASSIFIER_MODEL_FILE).exists()
}

pub fn detector_present(dir: &Path) -> bool {
    dir.join(DETECTOR_MODEL_FILE).exists()
}

/// Download both NudeNet models into `dir`, skipping files that already exist.
pub async fn download_model(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    let models = [
        ("Classifier", CLASSIFIER_MODEL_FILE, CLASSIFIER_URL, "~80 MB"),
        ("Detector", DETECTOR_MODEL_FILE, DETECTOR_URL, "~12 MB"),
    ];

    for (name, file, url, size) in models {
        println!("\n{name} model:");
        let dest = dir.join(file);
        if dest.exists() {
            info!(file, "Model already exists, skipping");
            println!("  {file} (already exists)");
            continue;
        }
        println!("  Downloading {file} ({size})...");
        download_file(url, &dest).await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path with a progress bar.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .context("Invalid progress bar template")?
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .context("Invalid progress bar template")?,
            );
            pb
        }
    };

    let mut file = PartialFile::create(dest).await?;
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read response body")?
    {
        file.write(&chunk).await?;
        pb.set_position(file.written);
    }
    file.finish().await?;

    pb.finish_and_clear();
    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

/// A model file being written under a `.part` name, so an interrupted
/// download never looks like an installed model.
struct PartialFile {
    file: tokio::fs::File,
    partial: PathBuf,
    dest: PathBuf,
    written: u64,
}

impl PartialFile {
    async fn create(dest: &Path) -> Result<Self> {
        let partial = dest.with_extension("onnx.part");
        let file = tokio::fs::File::create(&partial)
            .await
            .with_context(|| format!("Failed to create {}", partial.display()))?;
        Ok(Self {
            file,
            partial,
            dest: dest.to_path_buf(),
            written: 0,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("Failed to write {}", self.partial.display()))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and move into place under the final name.
    async fn finish(mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .with_context(|| format!("Failed to write {}", self.partial.display()))?;
        self.file
            .sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", self.partial.display()))?;
        drop(self.file);
        tokio::fs::rename(&self.partial, &self.dest)
            .await
            .with_context(|| format!("Failed to move model into {}", self.dest.display()))?;
        Ok(())
    }
}
