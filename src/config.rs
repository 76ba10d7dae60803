use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::policy::{VerdictPolicy, DEFAULT_THRESHOLD, NSFW_LABELS};

/// Port used when no valid port is given on the command line.
pub const DEFAULT_PORT: u16 = 5000;

/// The service only ever listens on loopback.
pub const BIND_ADDR: &str = "127.0.0.1";

/// Which capability to load at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPreference {
    /// Classifier if installed, otherwise the detector (default)
    Auto,
    /// Classifier only, no fallback
    Classifier,
    /// Detector only
    Detector,
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the NudeNet ONNX files
    pub model_dir: PathBuf,
    pub model_preference: ModelPreference,
    /// Verdict threshold for the unsafe probability / detection score
    pub threshold: f64,
    /// Detector labels that count towards an NSFW verdict
    pub nsfw_labels: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model_preference = match lookup("NSFWD_MODEL").as_deref() {
            Some("classifier") => ModelPreference::Classifier,
            Some("detector") => ModelPreference::Detector,
            // "auto", unset, or anything unrecognised
            _ => ModelPreference::Auto,
        };

        let model_dir = lookup("NSFWD_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(crate::model::download::default_model_dir);

        let threshold = match lookup("NSFWD_THRESHOLD") {
            Some(raw) => {
                let value: f64 = raw.trim().parse().map_err(|_| {
                    anyhow::anyhow!("NSFWD_THRESHOLD must be a number, got {raw:?}")
                })?;
                if !(0.0..=1.0).contains(&value) {
                    anyhow::bail!("NSFWD_THRESHOLD must be between 0 and 1, got {value}");
                }
                value
            }
            None => DEFAULT_THRESHOLD,
        };

        let nsfw_labels = match lookup("NSFWD_LABELS") {
            Some(raw) => {
                let labels: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                if labels.is_empty() {
                    anyhow::bail!("NSFWD_LABELS is set but contains no labels");
                }
                labels
            }
            None => NSFW_LABELS.iter().map(|l| l.to_string()).collect(),
        };

        Ok(Self {
            model_dir,
            model_preference,
            threshold,
            nsfw_labels,
        })
    }

    /// The verdict policy described by this configuration.
    pub fn policy(&self) -> VerdictPolicy {
        VerdictPolicy::new(self.threshold, self.nsfw_labels.iter().cloned())
    }
}

/// Parse the optional port argument. Anything that isn't a valid port number
/// silently falls back to DEFAULT_PORT.
pub fn parse_port(arg: Option<&str>) -> u16 {
    arg.and_then(|a| a.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
