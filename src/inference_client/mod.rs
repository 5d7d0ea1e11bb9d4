//! InferenceClient - Detector / Classifier Capabilities
//!
//! ## Responsibilities
//!
//! - `Detector`: frame -> ordered list of raw detections
//! - `Classifier`: vehicle crop -> target verdict
//! - Remote adapter for an HTTP inference server
//!
//! Both capabilities are synchronous and potentially slow. Callers run
//! them on the blocking pool, never on a runtime worker thread.

mod remote;

pub use remote::{RemoteClassifier, RemoteDetector, RemoteInferenceClient};

use crate::frame_source::Frame;
use crate::models::RawDetection;
use image::RgbImage;

/// Capability failure (never escapes the detection pipeline)
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    /// Transport or server failure
    #[error("Inference request failed: {0}")]
    Request(String),

    /// Response could not be interpreted
    #[error("Invalid inference response: {0}")]
    Response(String),

    /// Input image could not be encoded
    #[error("Image encoding failed: {0}")]
    Encode(String),

    /// The capability panicked
    #[error("Inference capability panicked: {0}")]
    Panicked(String),
}

/// Object detector capability
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>, CapabilityError>;
}

/// Crop classifier capability (true = target vehicle)
pub trait Classifier: Send + Sync {
    fn classify(&self, crop: &RgbImage) -> Result<bool, CapabilityError>;
}
