//! Detection collaborator boundary
//!
//! The model itself runs outside this crate. A detector takes an image path
//! and returns labelled boxes with confidences; only labels and confidences
//! matter here.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::error::ClientError;

/// One detection from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, e.g. `normal` or `worn_80`
    pub label: String,
    /// Confidence level (0.0 - 1.0)
    #[serde(alias = "conf")]
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Why detection produced nothing usable
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Model or detector program missing
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),
    /// Detector ran but failed
    #[error("detection failed: {0}")]
    Failed(String),
}

impl From<DetectionError> for ClientError {
    fn from(e: DetectionError) -> Self {
        ClientError::Inference(e.to_string())
    }
}

/// Image → detections
pub trait DetectionEngine: Send + Sync {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectionError>;
}

/// Runs an external detector process.
///
/// The process gets the image (and model) path through `{image}` / `{model}`
/// placeholders and must print a JSON array of `{"label", "confidence"}`
/// objects on stdout.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    model_path: Option<PathBuf>,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["{image}".to_string()],
            model_path: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(model_path.into());
        self
    }

    /// `None` when no detector program is configured
    pub fn from_config(config: &DetectorConfig) -> Option<Self> {
        let program = config.program.as_ref()?;
        let mut detector = Self::new(program.clone()).with_args(config.args.iter().cloned());
        detector.model_path = config.model_path.clone();
        Some(detector)
    }

    fn expand_args(&self, image: &Path) -> Vec<String> {
        let image = image.display().to_string();
        let model = self
            .model_path
            .as_ref()
            .map(|p| p.display().to_string());

        self.args
            .iter()
            .filter(|arg| model.is_some() || arg.as_str() != "{model}")
            .map(|arg| {
                let arg = arg.replace("{image}", &image);
                match &model {
                    Some(model) => arg.replace("{model}", model),
                    None => arg,
                }
            })
            .collect()
    }
}

impl DetectionEngine for CommandDetector {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectionError> {
        if let Some(model) = &self.model_path {
            if !model.exists() {
                return Err(DetectionError::ModelUnavailable(format!(
                    "model file {} not found",
                    model.display()
                )));
            }
        }

        let output = Command::new(&self.program)
            .args(self.expand_args(image))
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    DetectionError::ModelUnavailable(format!("{}: {}", self.program, e))
                }
                _ => DetectionError::Failed(format!("{}: {}", self.program, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectionError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_detections(&output.stdout)
    }
}

/// Parse detector output
pub fn parse_detections(bytes: &[u8]) -> Result<Vec<Detection>, DetectionError> {
    serde_json::from_slice(bytes)
        .map_err(|e| DetectionError::Failed(format!("invalid detector output: {}", e)))
}
