//! CameraSupervisor - Camera Registration and Worker Lifecycle
//!
//! ## Responsibilities
//!
//! - Validate and register cameras (idempotent by id)
//! - Enforce MAX_CAMERAS over running workers
//! - Spawn one worker per camera and deliver cooperative stop signals
//! - Remove cameras and shut all workers down
//!
//! Registration returns as soon as the worker is spawned; it never waits
//! for the source to connect.

mod worker;


use crate::alert_hub::AlertHub;
use crate::camera_directory::CameraDirectory;
use crate::detection_pipeline::PipelineConfig;
use crate::detection_sink::DetectionSink;
use crate::error::{Error, Result};
use crate::frame_source::SourceOpener;
use crate::inference_client::{Classifier, Detector};
use crate::live_state::LiveStateStore;
use crate::models::{CameraDescriptor, CameraStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use worker::CameraWorker;

const MAX_CAMERA_ID_LEN: usize = 64;

/// Components every worker needs
pub struct WorkerDeps {
    pub opener: Arc<dyn SourceOpener>,
    pub detector: Arc<dyn Detector>,
    pub classifier: Arc<dyn Classifier>,
    pub pipeline_config: PipelineConfig,
    pub live_state: Arc<LiveStateStore>,
    pub sink: Arc<dyn DetectionSink>,
    pub alerts: AlertHub,
    pub directory: Arc<dyn CameraDirectory>,
    pub connect_timeout: Duration,
}

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.join.is_finished()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

pub(crate) struct CameraSlot {
    descriptor: CameraDescriptor,
    worker: Option<WorkerHandle>,
}

impl CameraSlot {
    fn live_worker(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref().filter(|w| w.is_alive())
    }
}

pub(crate) type SlotMap = Arc<RwLock<HashMap<String, CameraSlot>>>;

/// CameraSupervisor instance
pub struct CameraSupervisor {
    deps: Arc<WorkerDeps>,
    slots: SlotMap,
    /// Serializes register / remove / shutdown
    lifecycle: Mutex<()>,
    max_cameras: usize,
}

impl CameraSupervisor {
    pub fn new(deps: WorkerDeps, max_cameras: usize) -> Self {
        Self {
            deps: Arc::new(deps),
            slots: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Mutex::new(()),
            max_cameras,
        }
    }

    /// Register or update a camera and make sure a worker is running
    pub async fn register(
        &self,
        camera_id: &str,
        location: &str,
        source_uri: &str,
    ) -> Result<CameraDescriptor> {
        let camera_id = camera_id.trim();
        let location = location.trim();
        let source_uri = source_uri.trim();
        validate_registration(camera_id, source_uri)?;

        let _guard = self.lifecycle.lock().await;
        let mut slots = self.slots.write().await;
        let running = slots.values().filter(|s| s.live_worker().is_some()).count();

        if let Some(slot) = slots.get_mut(camera_id) {
            if let Some(worker) = slot.live_worker() {
                if worker.stop_requested() || !slot.descriptor.status.is_active() {
                    return Err(Error::Conflict(format!(
                        "Camera {} is still shutting down",
                        camera_id
                    )));
                }

                // Running worker keeps its source until restarted
                let mut updated = slot.descriptor.clone();
                updated.location = location.to_string();
                updated.source_uri = source_uri.to_string();
                updated.updated_at = Utc::now();
                self.deps.directory.upsert(&updated).await?;
                slot.descriptor = updated.clone();

                tracing::info!(camera_id = %camera_id, "Camera metadata updated");
                return Ok(updated);
            }

            self.check_capacity(running)?;

            let mut restarted = slot.descriptor.clone();
            restarted.location = location.to_string();
            restarted.source_uri = source_uri.to_string();
            restarted.status = CameraStatus::Registered;
            restarted.updated_at = Utc::now();
            self.deps.directory.upsert(&restarted).await?;

            slot.descriptor = restarted.clone();
            slot.worker = Some(self.spawn_worker(&restarted));

            tracing::info!(camera_id = %camera_id, "Camera worker restarted");
            return Ok(restarted);
        }

        self.check_capacity(running)?;

        let descriptor = CameraDescriptor::new(
            camera_id.to_string(),
            location.to_string(),
            source_uri.to_string(),
        );
        self.deps.directory.upsert(&descriptor).await?;

        let worker = self.spawn_worker(&descriptor);
        slots.insert(
            camera_id.to_string(),
            CameraSlot {
                descriptor: descriptor.clone(),
                worker: Some(worker),
            },
        );

        tracing::info!(
            camera_id = %camera_id,
            location = %location,
            active = running + 1,
            "Camera registered"
        );
        Ok(descriptor)
    }

    fn check_capacity(&self, running: usize) -> Result<()> {
        if running >= self.max_cameras {
            tracing::warn!(running, max = self.max_cameras, "Camera registration rejected");
            return Err(Error::OverCapacity(format!(
                "{} of {} camera workers running",
                running, self.max_cameras
            )));
        }
        Ok(())
    }

    fn spawn_worker(&self, descriptor: &CameraDescriptor) -> WorkerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let worker = CameraWorker::new(
            descriptor.id.clone(),
            descriptor.source_uri.clone(),
            stop.clone(),
            self.deps.clone(),
            self.slots.clone(),
        );

        WorkerHandle {
            stop,
            join: tokio::spawn(worker.run()),
        }
    }

    /// Signal the camera's worker to stop (returns immediately)
    pub async fn stop(&self, camera_id: &str) -> Result<CameraDescriptor> {
        let slots = self.slots.read().await;
        let slot = slots
            .get(camera_id)
            .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;

        if let Some(worker) = slot.live_worker() {
            worker.request_stop();
            tracing::info!(camera_id = %camera_id, "Stop signal sent");
        }
        Ok(slot.descriptor.clone())
    }

    /// Stop the worker, wait for it to exit, then forget the camera
    pub async fn remove(&self, camera_id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let worker = {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(camera_id)
                .ok_or_else(|| Error::NotFound(format!("Camera {} not found", camera_id)))?;
            slot.worker.take()
        };

        if let Some(worker) = worker {
            worker.request_stop();
            if let Err(e) = worker.join.await {
                tracing::error!(camera_id = %camera_id, error = %e, "Camera worker aborted");
            }
        }

        self.slots.write().await.remove(camera_id);
        self.deps.live_state.remove(camera_id);
        self.deps.alerts.forget_camera(camera_id);
        self.deps.directory.remove(camera_id).await?;

        tracing::info!(camera_id = %camera_id, "Camera removed");
        Ok(())
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraDescriptor> {
        self.slots
            .read()
            .await
            .get(camera_id)
            .map(|s| s.descriptor.clone())
    }

    /// All cameras, ordered by id
    pub async fn list(&self) -> Vec<CameraDescriptor> {
        let mut cameras: Vec<_> = self
            .slots
            .read()
            .await
            .values()
            .map(|s| s.descriptor.clone())
            .collect();
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        cameras
    }

    /// Number of running workers
    pub async fn active_count(&self) -> usize {
        self.slots
            .read()
            .await
            .values()
            .filter(|s| s.live_worker().is_some())
            .count()
    }

    /// Stop every worker and wait for all of them to exit
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        let workers: Vec<(String, WorkerHandle)> = {
            let mut slots = self.slots.write().await;
            slots
                .iter_mut()
                .filter_map(|(id, slot)| slot.worker.take().map(|w| (id.clone(), w)))
                .collect()
        };

        for (_, worker) in &workers {
            worker.request_stop();
        }

        let count = workers.len();
        for (camera_id, worker) in workers {
            if let Err(e) = worker.join.await {
                tracing::error!(camera_id = %camera_id, error = %e, "Camera worker aborted");
            }
        }

        tracing::info!(workers = count, "Camera supervisor shut down");
    }
}

fn validate_registration(camera_id: &str, source_uri: &str) -> Result<()> {
    if camera_id.is_empty() {
        return Err(Error::Validation("camera_id is required".to_string()));
    }
    if camera_id.chars().count() > MAX_CAMERA_ID_LEN {
        return Err(Error::Validation(format!(
            "camera_id must be at most {} characters",
            MAX_CAMERA_ID_LEN
        )));
    }
    if source_uri.is_empty() {
        return Err(Error::Validation("source_uri is required".to_string()));
    }
    Ok(())
}
