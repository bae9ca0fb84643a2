//! Detections → wear estimate
//!
//! Labels follow the training set naming: `normal` for an intact sole and
//! `<name>_<percent>` for worn ones. The worst accepted detection wins.
//! Everything that is not a clean detection result goes through a
//! [`FallbackPolicy`].

use rand::Rng;
use std::path::Path;

use super::detector::{CommandDetector, Detection, DetectionEngine, DetectionError};
use crate::config::DetectorConfig;
use crate::error::ClientError;
use crate::protocol::WearEstimate;

/// Default minimum confidence for a detection to count
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Values used when detections cannot give an answer
pub trait FallbackPolicy: Send + Sync {
    /// Nothing detected above the confidence threshold
    fn no_detections(&self) -> f64 {
        10.0
    }

    /// No model, or the image to analyze is missing
    fn model_unavailable(&self) -> f64;

    /// The detector ran and failed
    fn processing_error(&self) -> f64;
}

/// Whole-number pseudo-random estimates: [75, 100] when the model is
/// unavailable, [10, 40] on processing errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFallback;

impl FallbackPolicy for RandomFallback {
    fn model_unavailable(&self) -> f64 {
        rand::rng().random_range(75.0..=100.0_f64).round()
    }

    fn processing_error(&self) -> f64 {
        rand::rng().random_range(10.0..=40.0_f64).round()
    }
}

/// Constant fallbacks, for bench setups and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedFallback {
    pub no_detections: f64,
    pub model_unavailable: f64,
    pub processing_error: f64,
}

impl FallbackPolicy for FixedFallback {
    fn no_detections(&self) -> f64 {
        self.no_detections
    }

    fn model_unavailable(&self) -> f64 {
        self.model_unavailable
    }

    fn processing_error(&self) -> f64 {
        self.processing_error
    }
}

/// Wraps the detection collaborator
pub struct InferenceAdapter {
    engine: Option<Box<dyn DetectionEngine>>,
    fallback: Box<dyn FallbackPolicy>,
    confidence_threshold: f32,
}

impl InferenceAdapter {
    /// `engine` is `None` when no model is available
    pub fn new(engine: Option<Box<dyn DetectionEngine>>) -> Self {
        Self {
            engine,
            fallback: Box::new(RandomFallback),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        let engine = CommandDetector::from_config(config)
            .map(|detector| Box::new(detector) as Box<dyn DetectionEngine>);
        if engine.is_none() {
            log::warn!("No detector configured, wear estimates will be fallback values");
        }
        Self::new(engine).with_threshold(config.confidence_threshold)
    }

    pub fn with_fallback(mut self, fallback: Box<dyn FallbackPolicy>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Estimate wear for the image at `image`. Never fails.
    pub fn estimate(&self, image: &Path) -> WearEstimate {
        let Some(engine) = &self.engine else {
            return WearEstimate::new(self.fallback.model_unavailable());
        };

        if !image.exists() {
            log::warn!("Image {} not found, using fallback estimate", image.display());
            return WearEstimate::new(self.fallback.model_unavailable());
        }

        match engine.detect(image) {
            Ok(detections) => self.wear_from_detections(&detections),
            Err(DetectionError::ModelUnavailable(reason)) => {
                log::warn!("Detection model unavailable: {}", reason);
                WearEstimate::new(self.fallback.model_unavailable())
            }
            Err(e) => {
                log::warn!("{}", ClientError::from(e));
                WearEstimate::new(self.fallback.processing_error())
            }
        }
    }

    /// Apply the label policy to a detection set. A zero maximum is
    /// reported as the no-detection value.
    pub fn wear_from_detections(&self, detections: &[Detection]) -> WearEstimate {
        match max_wear(detections, self.confidence_threshold) {
            Some(wear) if wear > 0 => WearEstimate::new(f64::from(wear)),
            _ => WearEstimate::new(self.fallback.no_detections()),
        }
    }
}

/// Highest wear among detections at or above `threshold`; `None` when no
/// detection qualifies.
pub fn max_wear(detections: &[Detection], threshold: f32) -> Option<u32> {
    detections
        .iter()
        .filter(|d| !d.confidence.is_nan() && d.confidence >= threshold)
        .map(|d| label_wear(&d.label))
        .max()
}

/// Wear encoded in a class label
pub fn label_wear(label: &str) -> u32 {
    if label.to_lowercase().contains("normal") {
        return 0;
    }

    label
        .split('_')
        .nth(1)
        .and_then(|percent| percent.trim().parse::<i64>().ok())
        .map(|percent| percent.clamp(0, 100) as u32)
        .unwrap_or(0)
}
