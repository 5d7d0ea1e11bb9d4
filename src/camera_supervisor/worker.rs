//! Per-camera worker loop

use super::{SlotMap, WorkerDeps};
use crate::detection_pipeline::{panic_message, DetectionPipeline, PipelineFault, PipelineOutput};
use crate::error::{Error, Result};
use crate::frame_source::{Frame, FrameSource};
use crate::live_state::LiveStateEntry;
use crate::models::{CameraStatus, DetectionEvent};
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct FrameMeta {
    sequence: u64,
    width: u32,
    height: u32,
}

enum Step {
    Processed(FrameMeta, PipelineOutput),
    Panicked(u64, String),
}

/// Process one frame on the blocking pool; the pipeline travels with it
async fn process_frame(
    mut pipeline: DetectionPipeline,
    frame: Frame,
) -> std::result::Result<(DetectionPipeline, Step), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let meta = FrameMeta {
            sequence: frame.sequence,
            width: frame.width(),
            height: frame.height(),
        };
        let step = match catch_unwind(AssertUnwindSafe(|| pipeline.process(&frame))) {
            Ok(output) => Step::Processed(meta, output),
            Err(payload) => Step::Panicked(meta.sequence, panic_message(payload.as_ref())),
        };
        (pipeline, step)
    })
    .await
}

/// Worker for one camera; sole writer of its live entry and status
pub(crate) struct CameraWorker {
    camera_id: String,
    source_uri: String,
    stop: Arc<AtomicBool>,
    deps: Arc<WorkerDeps>,
    slots: SlotMap,
}

impl CameraWorker {
    pub(crate) fn new(
        camera_id: String,
        source_uri: String,
        stop: Arc<AtomicBool>,
        deps: Arc<WorkerDeps>,
        slots: SlotMap,
    ) -> Self {
        Self {
            camera_id,
            source_uri,
            stop,
            deps,
            slots,
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) async fn run(self) {
        tracing::info!(camera_id = %self.camera_id, source_uri = %self.source_uri, "Camera worker started");

        let mut source = match self.open_source().await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(camera_id = %self.camera_id, error = %e, "Failed to open camera source");
                self.report_status(CameraStatus::Failed).await;
                return;
            }
        };

        if self.stop_requested() {
            drop(source);
            self.report_status(CameraStatus::Stopped).await;
            return;
        }
        self.report_status(CameraStatus::Streaming).await;

        let mut pipeline = Some(DetectionPipeline::new(
            self.deps.detector.clone(),
            self.deps.classifier.clone(),
            self.deps.pipeline_config.clone(),
        ));

        while let Some(current) = pipeline.take() {
            if self.stop_requested() {
                tracing::info!(camera_id = %self.camera_id, "Stop requested");
                pipeline = Some(current);
                break;
            }

            let frame = match source.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!(camera_id = %self.camera_id, "Stream ended");
                    pipeline = Some(current);
                    break;
                }
                Err(e) => {
                    tracing::warn!(camera_id = %self.camera_id, error = %e, "Frame read failed, stopping worker");
                    pipeline = Some(current);
                    break;
                }
            };

            let (current, step) = match process_frame(current, frame).await {
                Ok(result) => result,
                Err(e) => {
                    // Runtime shutting down; the pipeline went down with the task
                    tracing::error!(camera_id = %self.camera_id, error = %e, "Frame task aborted");
                    break;
                }
            };
            pipeline = Some(current);

            match step {
                Step::Processed(meta, output) => self.handle_output(meta, output).await,
                Step::Panicked(sequence, message) => {
                    tracing::error!(
                        camera_id = %self.camera_id,
                        frame_index = sequence,
                        panic = %message,
                        "Pipeline panicked, frame skipped"
                    );
                }
            }
        }

        if let Some(pipeline) = pipeline {
            let stats = pipeline.stats();
            tracing::info!(
                camera_id = %self.camera_id,
                frames = stats.frames,
                detector_failures = stats.detector_failures,
                classifier_failures = stats.classifier_failures,
                zero_area_crops = stats.zero_area_crops,
                "Camera worker finished"
            );
        }

        // Release the capture handle before reporting
        drop(source);
        self.report_status(CameraStatus::Stopped).await;
    }

    /// Open under the connect timeout; expiry drops the attempt, which
    /// releases anything it had acquired
    async fn open_source(&self) -> Result<Box<dyn FrameSource>> {
        let timeout = self.deps.connect_timeout;
        let open = self.deps.opener.open(&self.camera_id, &self.source_uri);

        match tokio::time::timeout(timeout, open).await {
            Ok(result) => result,
            Err(_) => Err(Error::source_error(
                &self.camera_id,
                format!("connect timeout ({}ms)", timeout.as_millis()),
            )),
        }
    }

    async fn handle_output(&self, meta: FrameMeta, output: PipelineOutput) {
        for fault in &output.faults {
            match fault {
                PipelineFault::Detector(e) => {
                    tracing::warn!(camera_id = %self.camera_id, frame_index = meta.sequence, error = %e, "Detector failed, frame skipped");
                }
                PipelineFault::Classifier { bbox, error } => {
                    tracing::warn!(
                        camera_id = %self.camera_id,
                        frame_index = meta.sequence,
                        bbox = ?bbox,
                        error = %error,
                        "Classifier failed, crop skipped"
                    );
                }
            }
        }
        if output.detector_failed() {
            return;
        }

        // In-flight frames finishing after a stop are discarded
        if self.stop_requested() {
            return;
        }

        let event = DetectionEvent::new(
            &self.camera_id,
            meta.sequence,
            meta.width,
            meta.height,
            output.observations,
        );

        self.deps.live_state.put(
            &self.camera_id,
            LiveStateEntry::new(event.clone(), output.frames_per_second, output.annotated),
        );

        if let Err(e) = self.deps.sink.append(&event).await {
            tracing::warn!(camera_id = %self.camera_id, event_id = %event.id, error = %e, "Detection event dropped");
        }

        self.deps.alerts.submit(&event);
    }

    /// Directory first, then the registry readers poll
    async fn report_status(&self, status: CameraStatus) {
        if let Err(e) = self.deps.directory.set_status(&self.camera_id, status).await {
            tracing::warn!(camera_id = %self.camera_id, status = %status, error = %e, "Failed to record camera status");
        }

        {
            let mut slots = self.slots.write().await;
            if let Some(slot) = slots.get_mut(&self.camera_id) {
                slot.descriptor.status = status;
                slot.descriptor.updated_at = Utc::now();
            }
        }

        tracing::info!(camera_id = %self.camera_id, status = %status, "Camera status changed");
    }
}
