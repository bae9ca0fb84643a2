//! Capture and wear analysis
//!
//! A trigger runs [`CapturePipeline`]: one frame from a [`CaptureSource`],
//! persisted raw and grayscale to the shared image store, scored by the
//! [`InferenceAdapter`] and reported to the server.

pub mod capture;
pub mod detector;
pub mod pipeline;
pub mod wear;

pub use capture::{
    create_capture_source, grab_frame, CaptureSource, CommandCapture, FrameSequenceCapture,
};
pub use detector::{CommandDetector, Detection, DetectionEngine, DetectionError};
pub use pipeline::{CapturePipeline, CaptureResult, ImageStore};
pub use wear::{FallbackPolicy, FixedFallback, InferenceAdapter, RandomFallback};
