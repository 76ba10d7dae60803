// ModelProvider: the one active capability, chosen once at startup.
//
// Selection order is classifier first, detector second. Only a model that is
// not installed moves on to the next candidate; an installed model that fails
// to load stops startup right there.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::classifier::OnnxClassifier;
use super::detector::OnnxDetector;
use super::traits::{ClassifierOutput, DetectorOutput, ImageClassifier, RegionDetector};
use crate::config::ModelPreference;
use crate::error::{InferenceError, InitializationError, LoadError};

/// Which capability is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Classifier,
    Detector,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifier => f.write_str("classifier"),
            Self::Detector => f.write_str("detector"),
        }
    }
}

/// Uninterpreted inference output, tagged by the kind that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Classifier {
        /// Key the classifier used for this image
        image_id: String,
        output: ClassifierOutput,
    },
    Detector(DetectorOutput),
}

impl RawOutput {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Classifier { .. } => ModelKind::Classifier,
            Self::Detector(_) => ModelKind::Detector,
        }
    }
}

/// The loaded capability. Cheap to clone; shared read-only across requests.
#[derive(Clone)]
pub enum ModelProvider {
    Classifier(Arc<dyn ImageClassifier>),
    Detector(Arc<dyn RegionDetector>),
}

impl fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelProvider").field(&self.kind()).finish()
    }
}

impl ModelProvider {
    /// Load the NudeNet ONNX models from `model_dir` according to `preference`.
    pub fn load(
        model_dir: &Path,
        preference: ModelPreference,
    ) -> Result<Self, InitializationError> {
        Self::initialize(
            preference,
            || OnnxClassifier::load(model_dir).map(|c| Arc::new(c) as Arc<dyn ImageClassifier>),
            || OnnxDetector::load(model_dir).map(|d| Arc::new(d) as Arc<dyn RegionDetector>),
        )
    }

    /// Run the selection sequence with the given loaders.
    ///
    /// `Auto` tries the classifier, then the detector if the classifier is
    /// `Unavailable`. A pinned preference tries only that loader.
    pub fn initialize<C, D>(
        preference: ModelPreference,
        load_classifier: C,
        load_detector: D,
    ) -> Result<Self, InitializationError>
    where
        C: FnOnce() -> Result<Arc<dyn ImageClassifier>, LoadError>,
        D: FnOnce() -> Result<Arc<dyn RegionDetector>, LoadError>,
    {
        let mut causes = Vec::new();

        if preference != ModelPreference::Detector {
            match load_classifier() {
                Ok(classifier) => {
                    info!(kind = %ModelKind::Classifier, "NSFW model loaded");
                    return Ok(Self::Classifier(classifier));
                }
                Err(err @ LoadError::Failed { .. }) => {
                    return Err(InitializationError { causes: vec![err] });
                }
                Err(err) => {
                    if preference == ModelPreference::Auto {
                        warn!(error = %err, "Classifier unavailable, trying detector");
                    }
                    causes.push(err);
                }
            }
        }

        if preference != ModelPreference::Classifier {
            match load_detector() {
                Ok(detector) => {
                    info!(kind = %ModelKind::Detector, "NSFW model loaded");
                    return Ok(Self::Detector(detector));
                }
                Err(err) => causes.push(err),
            }
        }

        Err(InitializationError { causes })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Classifier(_) => ModelKind::Classifier,
            Self::Detector(_) => ModelKind::Detector,
        }
    }

    /// Run the active capability on `path` and return its raw output.
    pub async fn infer(&self, path: &Path) -> Result<RawOutput, InferenceError> {
        match self {
            Self::Classifier(classifier) => {
                let output = classifier.classify(path).await?;
                Ok(RawOutput::Classifier {
                    image_id: path.to_string_lossy().into_owned(),
                    output,
                })
            }
            Self::Detector(detector) => Ok(RawOutput::Detector(detector.detect(path).await?)),
        }
    }
}
