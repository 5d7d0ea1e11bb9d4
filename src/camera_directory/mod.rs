//! CameraDirectory - Camera Metadata Store
//!
//! ## Responsibilities
//!
//! - Upsert camera descriptors by id
//! - Record status transitions reported by workers
//! - List and remove cameras
//!
//! The supervisor owns the live registry; the directory is the
//! externally visible copy of camera metadata.

use crate::error::{Error, Result};
use crate::models::{CameraDescriptor, CameraStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera metadata store
#[async_trait]
pub trait CameraDirectory: Send + Sync {
    /// Insert or replace by id (first registration time is kept)
    async fn upsert(&self, descriptor: &CameraDescriptor) -> Result<()>;

    async fn set_status(&self, camera_id: &str, status: CameraStatus) -> Result<()>;

    async fn get(&self, camera_id: &str) -> Result<Option<CameraDescriptor>>;

    async fn list(&self) -> Result<Vec<CameraDescriptor>>;

    /// Returns whether the camera existed
    async fn remove(&self, camera_id: &str) -> Result<bool>;
}

/// In-process directory
#[derive(Debug, Default)]
pub struct MemoryCameraDirectory {
    cameras: RwLock<HashMap<String, CameraDescriptor>>,
}

impl MemoryCameraDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CameraDirectory for MemoryCameraDirectory {
    async fn upsert(&self, descriptor: &CameraDescriptor) -> Result<()> {
        let mut cameras = self.cameras.write().await;
        let mut stored = descriptor.clone();
        if let Some(existing) = cameras.get(&descriptor.id) {
            stored.registered_at = existing.registered_at;
        }
        cameras.insert(descriptor.id.clone(), stored);
        Ok(())
    }

    async fn set_status(&self, camera_id: &str, status: CameraStatus) -> Result<()> {
        let mut cameras = self.cameras.write().await;
        let camera = cameras
            .get_mut(camera_id)
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;
        camera.status = status;
        camera.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, camera_id: &str) -> Result<Option<CameraDescriptor>> {
        Ok(self.cameras.read().await.get(camera_id).cloned())
    }

    async fn list(&self) -> Result<Vec<CameraDescriptor>> {
        let mut cameras: Vec<_> = self.cameras.read().await.values().cloned().collect();
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cameras)
    }

    async fn remove(&self, camera_id: &str) -> Result<bool> {
        Ok(self.cameras.write().await.remove(camera_id).is_some())
    }
}
