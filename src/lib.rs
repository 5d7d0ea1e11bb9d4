//! Vehicle Watch Library
//!
//! Multi-camera vehicle detection engine
//!
//! ## Architecture (9 Components)
//!
//! 1. CameraSupervisor - Registration and per-camera worker lifecycle
//! 2. FrameSource - Frame capture (ffmpeg, scripted)
//! 3. InferenceClient - Detector / Classifier capabilities
//! 4. DetectionPipeline - Filter, crop, classify, annotate
//! 5. LiveStateStore - Latest result per camera
//! 6. DetectionSink - Durable event store
//! 7. AlertHub - De-duplicated target alerts
//! 8. CameraDirectory - Camera metadata
//! 9. WebAPI - REST endpoints and alert stream
//!
//! ## Design Principles
//!
//! - One worker per camera; a camera's failure never affects another
//! - Workers are the only writers of their camera's status and live entry
//! - Capability and persistence faults are logged and absorbed

pub mod alert_hub;
pub mod camera_directory;
pub mod camera_supervisor;
pub mod detection_pipeline;
pub mod detection_sink;
pub mod frame_source;
pub mod inference_client;
pub mod live_state;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use state::AppState;
