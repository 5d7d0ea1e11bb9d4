//! Shared models and types
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Camera lifecycle status (transitions owned by the camera's worker)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Registered,
    Streaming,
    Stopped,
    Failed,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Registered => "registered",
            CameraStatus::Streaming => "streaming",
            CameraStatus::Stopped => "stopped",
            CameraStatus::Failed => "failed",
        }
    }

    /// Registered and streaming cameras hold a worker slot
    pub fn is_active(&self) -> bool {
        matches!(self, CameraStatus::Registered | CameraStatus::Streaming)
    }
}

impl std::fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub id: String,
    pub location: String,
    pub source_uri: String,
    pub status: CameraStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CameraDescriptor {
    pub fn new(id: String, location: String, source_uri: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            location,
            source_uri,
            status: CameraStatus::Registered,
            registered_at: now,
            updated_at: now,
        }
    }
}

/// Pixel bounding box (x1, y1) top-left, (x2, y2) bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Clip to a `width` x `height` frame
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let w = width.min(i32::MAX as u32) as i32;
        let h = height.min(i32::MAX as u32) as i32;
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }
}

/// Detector output for one object (not persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// Vehicle seen in a frame, with the classifier verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleObservation {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_label: String,
    pub is_target: bool,
}

/// Result of processing one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub camera_id: String,
    /// Per-camera frame sequence number
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub observations: Vec<VehicleObservation>,
    pub target_count: usize,
    pub total_count: usize,
}

impl DetectionEvent {
    pub fn new(
        camera_id: &str,
        frame_index: u64,
        frame_width: u32,
        frame_height: u32,
        observations: Vec<VehicleObservation>,
    ) -> Self {
        let target_count = observations.iter().filter(|o| o.is_target).count();
        let total_count = observations.len();
        Self {
            id: Uuid::new_v4(),
            camera_id: camera_id.to_string(),
            frame_index,
            timestamp: Utc::now(),
            frame_width,
            frame_height,
            observations,
            target_count,
            total_count,
        }
    }

    pub fn first_target(&self) -> Option<&VehicleObservation> {
        self.observations.iter().find(|o| o.is_target)
    }
}

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub active_cameras: usize,
    pub alert_subscribers: usize,
}
