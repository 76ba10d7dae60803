// Verdict policy: turns raw model output into a yes/no decision.
//
// Pure function of its inputs: no I/O, no logging. Both the threshold and
// the label set are configurable but default to the values below.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::provider::RawOutput;
use crate::model::traits::{ClassProbabilities, DetectionBox, DetectorOutput};

/// Scores must be strictly greater than this to count as NSFW.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Detector labels treated as sensitive by default.
pub const NSFW_LABELS: [&str; 5] = [
    "BUTTOCKS_EXPOSED",
    "FEMALE_BREAST_EXPOSED",
    "FEMALE_GENITALIA_EXPOSED",
    "MALE_GENITALIA_EXPOSED",
    "ANUS_EXPOSED",
];

/// Supporting detail returned alongside a verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Details {
    /// The classifier's probabilities for the image
    Probabilities(ClassProbabilities),
    /// Every detection, counting or not, in producer order
    Detections(DetectorOutput),
    /// The classifier returned nothing for this image; serializes as `{}`
    Missing {},
}

/// The decision for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub is_nsfw: bool,
    pub probability: f64,
    pub details: Details,
}

#[derive(Debug, Clone)]
pub struct VerdictPolicy {
    pub threshold: f64,
    pub nsfw_labels: HashSet<String>,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, NSFW_LABELS.iter().map(|l| l.to_string()))
    }
}

impl VerdictPolicy {
    pub fn new(threshold: f64, labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            threshold,
            nsfw_labels: labels.into_iter().collect(),
        }
    }

    pub fn decide(&self, raw: RawOutput) -> Verdict {
        match raw {
            RawOutput::Classifier {
                image_id,
                mut output,
            } => match output.remove(&image_id) {
                Some(probs) => Verdict {
                    is_nsfw: probs.unsafe_ > self.threshold,
                    probability: probs.unsafe_,
                    details: Details::Probabilities(probs),
                },
                // Lenient on purpose: a missing entry reads as 0.0, not an error
                None => Verdict {
                    is_nsfw: false,
                    probability: 0.0,
                    details: Details::Missing {},
                },
            },
            RawOutput::Detector(detections) => {
                let best = detections
                    .iter()
                    .filter(|d| self.counts(d))
                    .map(|d| d.score)
                    .reduce(f64::max);
                Verdict {
                    is_nsfw: best.is_some(),
                    probability: best.unwrap_or(0.0),
                    details: Details::Detections(detections),
                }
            }
        }
    }

    /// A detection counts when its label is sensitive and its score clears the threshold.
    pub fn counts(&self, detection: &DetectionBox) -> bool {
        self.nsfw_labels.contains(&detection.label) && detection.score > self.threshold
    }
}
