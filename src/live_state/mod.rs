//! LiveStateStore - Latest Result Per Camera
//!
//! ## Responsibilities
//!
//! - Hold the most recent DetectionEvent for each camera
//! - Keep the latest annotated frame for display
//! - Serve concurrent readers while workers overwrite their own entry
//!
//! Entries are replaced as whole `Arc`s, so a reader observes either the
//! previous or the new entry for a camera.

use crate::models::DetectionEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;

/// Latest state of one camera
#[derive(Debug, Clone, Serialize)]
pub struct LiveStateEntry {
    pub camera_id: String,
    pub last_updated: DateTime<Utc>,
    pub last_event: DetectionEvent,
    pub frames_per_second: u32,
    #[serde(skip)]
    pub snapshot: Option<Arc<RgbImage>>,
}

impl LiveStateEntry {
    pub fn new(event: DetectionEvent, frames_per_second: u32, snapshot: Option<RgbImage>) -> Self {
        Self {
            camera_id: event.camera_id.clone(),
            last_updated: Utc::now(),
            last_event: event,
            frames_per_second,
            snapshot: snapshot.map(Arc::new),
        }
    }
}

/// Concurrent per-camera store
#[derive(Debug, Default)]
pub struct LiveStateStore {
    entries: DashMap<String, Arc<LiveStateEntry>>,
}

impl LiveStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `camera_id`
    pub fn put(&self, camera_id: &str, entry: LiveStateEntry) {
        self.entries.insert(camera_id.to_string(), Arc::new(entry));
    }

    pub fn get(&self, camera_id: &str) -> Option<Arc<LiveStateEntry>> {
        self.entries.get(camera_id).map(|e| e.value().clone())
    }

    /// All entries, ordered by camera id
    pub fn list(&self) -> Vec<Arc<LiveStateEntry>> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        entries
    }

    pub fn remove(&self, camera_id: &str) -> Option<Arc<LiveStateEntry>> {
        self.entries.remove(camera_id).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
