// Local ONNX image classifier using NudeNet's classifier_model.onnx.
//
// Model input: one 256x256 RGB image, values scaled to [0, 1], NHWC layout.
// Model output: two softmax probabilities, ordered unsafe then safe.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::download::{classifier_present, CLASSIFIER_MODEL_FILE};
use super::provider::ModelKind;
use super::traits::{ClassProbabilities, ClassifierOutput, ImageClassifier};
use crate::error::LoadError;

const INPUT_SIZE: u32 = 256;

/// Index of each probability in the model output row.
const UNSAFE_INDEX: usize = 0;
const SAFE_INDEX: usize = 1;

pub struct OnnxClassifier {
    // ort::Session::run takes &mut self; inference runs on spawn_blocking
    session: Arc<Mutex<Session>>,
}

impl OnnxClassifier {
    /// Load `classifier_model.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let model_path = model_dir.join(CLASSIFIER_MODEL_FILE);
        if !classifier_present(model_dir) {
            return Err(LoadError::Unavailable {
                kind: ModelKind::Classifier,
                path: model_path,
            });
        }

        let session = super::open_session(&model_path).map_err(|source| LoadError::Failed {
            kind: ModelKind::Classifier,
            source,
        })?;

        debug!("Loaded ONNX classifier from {}", model_path.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }
}

#[async_trait]
impl ImageClassifier for OnnxClassifier {
    async fn classify(&self, path: &Path) -> Result<ClassifierOutput> {
        let session = Arc::clone(&self.session);
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let pixels = load_pixels(&path)?;
            let shape = [1_i64, INPUT_SIZE as i64, INPUT_SIZE as i64, 3];
            let input = Tensor::from_array((shape, pixels))
                .context("Failed to create classifier input tensor")?;

            let row = {
                let mut session = super::lock_session(&session);

                let outputs = session
                    .run(ort::inputs![input])
                    .context("ONNX inference failed")?;

                let (_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;

                data.to_vec()
            };

            let probabilities = map_probabilities(&row)?;
            debug!(
                safe = probabilities.safe,
                unsafe_ = probabilities.unsafe_,
                path = %path.display(),
                "Classified image"
            );

            let mut output = ClassifierOutput::new();
            output.insert(path.to_string_lossy().into_owned(), probabilities);
            Ok(output)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Decode the image and lay it out as the model expects (NHWC, [0, 1]).
fn load_pixels(path: &Path) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Failed to decode image {}", path.display()))?;
    let rgb = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Nearest)
        .to_rgb8();
    Ok(rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect())
}

fn map_probabilities(row: &[f32]) -> Result<ClassProbabilities> {
    if row.len() < 2 {
        anyhow::bail!("Classifier returned {} values, expected 2", row.len());
    }
    Ok(ClassProbabilities {
        safe: f64::from(row[SAFE_INDEX]),
        unsafe_: f64::from(row[UNSAFE_INDEX]),
    })
}
