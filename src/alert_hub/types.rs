//! Alert hub types

use crate::error::Error;
use crate::models::DetectionEvent;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Default dedup window size (K)
pub const DEFAULT_DEDUP_WINDOW: usize = 10;

/// Default per-subscriber queue bound
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Alert kind on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    TargetDetected,
}

/// Alert pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub camera_id: String,
    /// RFC 3339
    pub timestamp: String,
    pub message: String,
    pub confidence: f32,
    #[serde(skip)]
    pub event_id: Uuid,
}

impl Alert {
    /// Alert for the first target observation; `None` without targets
    pub fn from_event(event: &DetectionEvent) -> Option<Self> {
        if event.target_count == 0 {
            return None;
        }
        let target = event.first_target()?;

        Some(Self {
            kind: AlertKind::TargetDetected,
            camera_id: event.camera_id.clone(),
            timestamp: event.timestamp.to_rfc3339(),
            message: format!("Target vehicle detected - {}", target.class_label),
            confidence: target.confidence,
            event_id: event.id,
        })
    }
}

/// Which events share a dedup window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// One window across all cameras
    #[default]
    Global,
    /// One window per camera id
    PerCamera,
}

impl FromStr for DedupScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(DedupScope::Global),
            "per_camera" | "per-camera" | "camera" => Ok(DedupScope::PerCamera),
            other => Err(Error::Config(format!(
                "DEDUP_SCOPE must be 'global' or 'per_camera', got '{}'",
                other
            ))),
        }
    }
}
