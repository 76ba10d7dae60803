// Local ONNX region detector using NudeNet's 320n.onnx (YOLOv8 export).
//
// Model input: RGB image padded bottom/right to a square, resized to 320x320,
// values scaled to [0, 1], NCHW layout.
// Model output: [1, 4 + 18, anchors]: centre-x, centre-y, width, height,
// then one score per label, for every anchor.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::download::{detector_present, DETECTOR_MODEL_FILE};
use super::provider::ModelKind;
use super::traits::{DetectionBox, DetectorOutput, RegionDetector};
use crate::error::LoadError;

const INPUT_SIZE: u32 = 320;

/// Anchors whose best label scores below this are dropped.
const MIN_SCORE: f32 = 0.2;

/// Boxes overlapping a higher-scored box by more than this IoU are dropped.
const NMS_IOU: f64 = 0.45;

/// Labels output by 320n.onnx, in the order the model returns them.
pub const LABELS: [&str; 18] = [
    "FEMALE_GENITALIA_COVERED",
    "FACE_FEMALE",
    "BUTTOCKS_EXPOSED",
    "FEMALE_BREAST_EXPOSED",
    "FEMALE_GENITALIA_EXPOSED",
    "MALE_BREAST_EXPOSED",
    "ANUS_EXPOSED",
    "FEET_EXPOSED",
    "BELLY_COVERED",
    "FEET_COVERED",
    "ARMPITS_COVERED",
    "ARMPITS_EXPOSED",
    "FACE_MALE",
    "BELLY_EXPOSED",
    "MALE_GENITALIA_EXPOSED",
    "ANUS_COVERED",
    "FEMALE_BREAST_COVERED",
    "BUTTOCKS_COVERED",
];

/// Values per anchor: four box coordinates plus one score per label.
const ROW_LEN: usize = 4 + LABELS.len();

pub struct OnnxDetector {
    session: Arc<Mutex<Session>>,
}

impl OnnxDetector {
    /// Load `320n.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let model_path = model_dir.join(DETECTOR_MODEL_FILE);
        if !detector_present(model_dir) {
            return Err(LoadError::Unavailable {
                kind: ModelKind::Detector,
                path: model_path,
            });
        }

        let session = super::open_session(&model_path).map_err(|source| LoadError::Failed {
            kind: ModelKind::Detector,
            source,
        })?;

        debug!("Loaded ONNX detector from {}", model_path.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }
}

#[async_trait]
impl RegionDetector for OnnxDetector {
    async fn detect(&self, path: &Path) -> Result<DetectorOutput> {
        let session = Arc::clone(&self.session);
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let (pixels, scale) = load_pixels(&path)?;
            let shape = [1_i64, 3, INPUT_SIZE as i64, INPUT_SIZE as i64];
            let input = Tensor::from_array((shape, pixels))
                .context("Failed to create detector input tensor")?;

            let data = {
                let mut session = super::lock_session(&session);

                let outputs = session
                    .run(ort::inputs![input])
                    .context("ONNX inference failed")?;

                let (_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;

                data.to_vec()
            };

            let detections = decode_detections(&data, scale)?;
            debug!(
                count = detections.len(),
                path = %path.display(),
                "Detected regions"
            );
            Ok(detections)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Decode, pad to square, resize, and lay out as NCHW in [0, 1].
///
/// Returns the pixels plus the factor mapping model coordinates back to
/// source image pixels.
fn load_pixels(path: &Path) -> Result<(Vec<f32>, f64)> {
    let img = image::open(path)
        .with_context(|| format!("Failed to decode image {}", path.display()))?
        .to_rgb8();

    let (width, height) = img.dimensions();
    let side = width.max(height);
    let mut square = RgbImage::new(side, side);
    image::imageops::replace(&mut square, &img, 0, 0);

    let resized = image::imageops::resize(&square, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * plane + i] = pixel[channel] as f32 / 255.0;
        }
    }

    Ok((data, f64::from(side) / f64::from(INPUT_SIZE)))
}

/// Turn the raw `[ROW_LEN, anchors]` output into labelled boxes in source
/// pixel coordinates, after score filtering and non-maximum suppression.
pub(crate) fn decode_detections(data: &[f32], scale: f64) -> Result<Vec<DetectionBox>> {
    if data.len() % ROW_LEN != 0 {
        anyhow::bail!(
            "Detector output has {} values, not a multiple of {}",
            data.len(),
            ROW_LEN
        );
    }
    let anchors = data.len() / ROW_LEN;
    let value = |feature: usize, anchor: usize| data[feature * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (label_index, score) = (0..LABELS.len())
            .map(|l| (l, value(4 + l, anchor)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .unwrap_or((0, 0.0));

        if score < MIN_SCORE {
            continue;
        }

        let cx = f64::from(value(0, anchor));
        let cy = f64::from(value(1, anchor));
        let w = f64::from(value(2, anchor));
        let h = f64::from(value(3, anchor));

        candidates.push(DetectionBox {
            region: [
                ((cx - w / 2.0) * scale).round(),
                ((cy - h / 2.0) * scale).round(),
                (w * scale).round(),
                (h * scale).round(),
            ],
            score: f64::from(score),
            label: LABELS[label_index].to_string(),
        });
    }

    Ok(non_max_suppression(candidates))
}

/// Greedy NMS: highest score first, drop anything overlapping a kept box.
fn non_max_suppression(mut candidates: Vec<DetectionBox>) -> Vec<DetectionBox> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<DetectionBox> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| iou(&k.region, &candidate.region) <= NMS_IOU)
        {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two `[x, y, width, height]` boxes.
fn iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let left = a[0].max(b[0]);
    let top = a[1].max(b[1]);
    let right = (a[0] + a[2]).min(b[0] + b[2]);
    let bottom = (a[1] + a[3]).min(b[1] + b[3]);

    let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = a[2] * a[3] + b[2] * b[3] - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
