// Capability traits and their raw output shapes.
//
// These are the contracts of the two underlying models. Field names on the
// wire follow NudeNet: the classifier reports `safe`/`unsafe`, the detector
// reports `box`/`score`/`class`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whole-image probabilities from the classifier. Both values are in [0, 1]
/// and sum to roughly 1.0 (the model guarantees this, we don't check it).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub safe: f64,
    #[serde(rename = "unsafe")]
    pub unsafe_: f64,
}

/// Classifier output: image identifier (the path as passed in) to probabilities.
pub type ClassifierOutput = HashMap<String, ClassProbabilities>;

/// One region found by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    /// `[x, y, width, height]` in source image pixels
    #[serde(rename = "box")]
    pub region: [f64; 4],
    pub score: f64,
    #[serde(rename = "class")]
    pub label: String,
}

/// Detector output, in the order the detector produced it.
pub type DetectorOutput = Vec<DetectionBox>;

/// Whole-image classifier capability.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Classify the image at `path`. The returned map is keyed by
    /// `path.to_string_lossy()`.
    async fn classify(&self, path: &Path) -> Result<ClassifierOutput>;
}

/// Region detector capability.
#[async_trait]
pub trait RegionDetector: Send + Sync {
    /// Detect labelled regions in the image at `path`.
    async fn detect(&self, path: &Path) -> Result<DetectorOutput>;
}
