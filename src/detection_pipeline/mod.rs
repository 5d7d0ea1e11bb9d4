//! DetectionPipeline - Per-Frame Vehicle Detection
//!
//! ## Responsibilities
//!
//! - Run the detector on a frame
//! - Filter by class allow-list and confidence threshold
//! - Crop and classify each surviving vehicle
//! - Track throughput and draw the display overlay
//!
//! `process` never fails: capability errors and panics are returned as
//! faults in the output and counted in `PipelineStats`.

mod annotate;
mod throughput;

pub use annotate::annotate;
pub use throughput::ThroughputMeter;

use crate::frame_source::Frame;
use crate::inference_client::{CapabilityError, Classifier, Detector};
use crate::models::{BBox, RawDetection, VehicleObservation};
use image::{imageops, RgbImage};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// COCO vehicle classes
pub const DEFAULT_TARGET_CLASSES: [u32; 4] = [2, 3, 5, 7];

pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.7;

/// Human label for a detector class id
pub fn class_label(class_id: u32) -> String {
    match class_id {
        2 => "car".to_string(),
        3 => "motorcycle".to_string(),
        5 => "bus".to_string(),
        7 => "truck".to_string(),
        other => format!("class_{}", other),
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run a capability call, turning a panic into a `CapabilityError`
fn guarded<T>(call: impl FnOnce() -> Result<T, CapabilityError>) -> Result<T, CapabilityError> {
    catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(CapabilityError::Panicked(panic_message(payload.as_ref()))))
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum confidence (inclusive)
    pub detection_threshold: f32,
    /// Class ids treated as vehicles
    pub target_classes: Vec<u32>,
    /// Produce an annotated copy of each frame
    pub annotate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            target_classes: DEFAULT_TARGET_CLASSES.to_vec(),
            annotate: true,
        }
    }
}

/// Capability failure reported alongside the frame result
#[derive(Debug, Clone)]
pub enum PipelineFault {
    Detector(CapabilityError),
    Classifier { bbox: BBox, error: CapabilityError },
}

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub observations: Vec<VehicleObservation>,
    pub annotated: Option<RgbImage>,
    pub faults: Vec<PipelineFault>,
    pub frames_per_second: u32,
}

impl PipelineOutput {
    /// The detector itself failed; observations are empty
    pub fn detector_failed(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, PipelineFault::Detector(_)))
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub detector_failures: u64,
    pub classifier_failures: u64,
    pub zero_area_crops: u64,
}

/// One worker's pipeline (capabilities are shared, state is not)
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    config: PipelineConfig,
    throughput: ThroughputMeter,
    stats: PipelineStats,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            classifier,
            config,
            throughput: ThroughputMeter::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Process one frame (blocking)
    pub fn process(&mut self, frame: &Frame) -> PipelineOutput {
        self.stats.frames += 1;
        let frames_per_second = self.throughput.tick(Instant::now());

        let detections = match guarded(|| self.detector.detect(frame)) {
            Ok(detections) => detections,
            Err(error) => {
                self.stats.detector_failures += 1;
                return PipelineOutput {
                    observations: Vec::new(),
                    annotated: None,
                    faults: vec![PipelineFault::Detector(error)],
                    frames_per_second,
                };
            }
        };

        let mut observations = Vec::new();
        let mut faults = Vec::new();

        for detection in detections {
            if !self.accepts(&detection) {
                continue;
            }

            let bbox = detection.bbox.clip(frame.width(), frame.height());
            if bbox.area() == 0 {
                self.stats.zero_area_crops += 1;
                continue;
            }

            let crop = imageops::crop_imm(
                frame.image(),
                bbox.x1 as u32,
                bbox.y1 as u32,
                bbox.width(),
                bbox.height(),
            )
            .to_image();

            match guarded(|| self.classifier.classify(&crop)) {
                Ok(is_target) => observations.push(VehicleObservation {
                    bbox,
                    confidence: detection.confidence,
                    class_label: class_label(detection.class_id),
                    is_target,
                }),
                Err(error) => {
                    self.stats.classifier_failures += 1;
                    faults.push(PipelineFault::Classifier { bbox, error });
                }
            }
        }

        let annotated = self
            .config
            .annotate
            .then(|| annotate(frame.image(), &observations));

        PipelineOutput {
            observations,
            annotated,
            faults,
            frames_per_second,
        }
    }

    fn accepts(&self, detection: &RawDetection) -> bool {
        detection.confidence >= self.config.detection_threshold
            && self.config.target_classes.contains(&detection.class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingDetector, FixedClassifier, ScriptedDetector};

    fn frame(sequence: u64) -> Frame {
        Frame::new(sequence, RgbImage::new(640, 480))
    }

    fn detection(bbox: BBox, confidence: f32, class_id: u32) -> RawDetection {
        RawDetection {
            bbox,
            confidence,
            class_id,
        }
    }

    fn pipeline(detector: ScriptedDetector, classifier: Arc<FixedClassifier>) -> DetectionPipeline {
        DetectionPipeline::new(Arc::new(detector), classifier, PipelineConfig::default())
    }

    #[test]
    fn test_threshold_and_allow_list_filter() {
        let detector = ScriptedDetector::new().on_frame(
            1,
            vec![
                detection(BBox::new(0, 0, 50, 50), 0.9, 2),   // car, kept
                detection(BBox::new(0, 0, 50, 50), 0.69, 2),  // below threshold
                detection(BBox::new(0, 0, 50, 50), 0.95, 0),  // person
                detection(BBox::new(10, 10, 90, 90), 0.7, 7), // truck at threshold
            ],
        );
        let classifier = Arc::new(FixedClassifier::new(false));
        let mut pipeline = pipeline(detector, classifier.clone());

        let output = pipeline.process(&frame(1));

        assert_eq!(output.observations.len(), 2);
        assert_eq!(output.observations[0].class_label, "car");
        assert_eq!(output.observations[1].class_label, "truck");
        assert!(output
            .observations
            .iter()
            .all(|o| o.confidence >= DEFAULT_DETECTION_THRESHOLD));
        assert_eq!(classifier.calls(), 2);
        assert!(output.faults.is_empty());
    }

    #[test]
    fn test_zero_area_crop_skips_classifier() {
        let detector = ScriptedDetector::new().on_frame(
            1,
            vec![
                detection(BBox::new(700, 10, 800, 60), 0.9, 2), // right of frame
                detection(BBox::new(20, 20, 20, 80), 0.9, 3),   // degenerate
            ],
        );
        let classifier = Arc::new(FixedClassifier::new(true));
        let mut pipeline = pipeline(detector, classifier.clone());

        let output = pipeline.process(&frame(1));

        assert!(output.observations.is_empty());
        assert!(output.faults.is_empty());
        assert_eq!(classifier.calls(), 0);
        assert_eq!(pipeline.stats().zero_area_crops, 2);
    }

    #[test]
    fn test_bbox_clipped_before_crop() {
        let detector = ScriptedDetector::new()
            .on_frame(1, vec![detection(BBox::new(-20, 400, 100, 600), 0.8, 5)]);
        let classifier = Arc::new(FixedClassifier::new(true));
        let mut pipeline = pipeline(detector, classifier);

        let output = pipeline.process(&frame(1));

        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.observations[0].bbox, BBox::new(0, 400, 100, 480));
        assert!(output.observations[0].is_target);
        assert_eq!(output.observations[0].class_label, "bus");
    }

    #[test]
    fn test_detector_failure_yields_empty_output() {
        let mut pipeline = DetectionPipeline::new(
            Arc::new(FailingDetector),
            Arc::new(FixedClassifier::new(true)),
            PipelineConfig::default(),
        );

        let output = pipeline.process(&frame(1));

        assert!(output.observations.is_empty());
        assert!(output.detector_failed());
        assert!(output.annotated.is_none());
        assert_eq!(pipeline.stats().detector_failures, 1);
    }

    #[test]
    fn test_classifier_failure_skips_only_that_crop() {
        let detector = ScriptedDetector::new().on_frame(
            1,
            vec![
                detection(BBox::new(0, 0, 50, 50), 0.9, 2),
                detection(BBox::new(100, 100, 200, 200), 0.9, 2),
            ],
        );
        let classifier = Arc::new(FixedClassifier::new(true).failing_on_call(1));
        let mut pipeline = pipeline(detector, classifier);

        let output = pipeline.process(&frame(1));

        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.observations[0].bbox, BBox::new(100, 100, 200, 200));
        assert!(!output.detector_failed());
        assert!(matches!(
            output.faults.as_slice(),
            [PipelineFault::Classifier { .. }]
        ));
        assert_eq!(pipeline.stats().classifier_failures, 1);
    }

    #[test]
    fn test_classifier_panic_skips_only_that_crop() {
        let detector = ScriptedDetector::new().on_frame(
            1,
            vec![
                detection(BBox::new(0, 0, 50, 50), 0.9, 2),
                detection(BBox::new(100, 100, 200, 200), 0.9, 3),
            ],
        );
        let classifier = Arc::new(FixedClassifier::new(true).panicking_on_call(1));
        let mut pipeline = pipeline(detector, classifier);

        let output = pipeline.process(&frame(1));

        assert_eq!(output.observations.len(), 1);
        assert_eq!(output.observations[0].class_label, "motorcycle");
        assert!(matches!(
            output.faults.as_slice(),
            [PipelineFault::Classifier {
                error: CapabilityError::Panicked(_),
                ..
            }]
        ));
        assert_eq!(pipeline.stats().classifier_failures, 1);
    }

    #[test]
    fn test_detector_panic_becomes_detector_fault() {
        let detector = ScriptedDetector::new().panicking_on(1);
        let mut pipeline = pipeline(detector, Arc::new(FixedClassifier::new(true)));

        let output = pipeline.process(&frame(1));

        assert!(output.detector_failed());
        assert!(output.observations.is_empty());
        assert_eq!(pipeline.stats().detector_failures, 1);

        // Next frame is processed normally
        assert!(!pipeline.process(&frame(2)).detector_failed());
    }

    #[test]
    fn test_panic_message_payloads() {
        let caught = catch_unwind(|| {
            panic!("boom {}", 1);
        })
        .unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 1");
        let caught = catch_unwind(|| {
            std::panic::panic_any(7u8);
        })
        .unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "unknown panic");
    }

    #[test]
    fn test_annotation_disabled() {
        let detector = ScriptedDetector::new()
            .on_frame(1, vec![detection(BBox::new(0, 0, 50, 50), 0.9, 2)]);
        let mut pipeline = DetectionPipeline::new(
            Arc::new(detector),
            Arc::new(FixedClassifier::new(true)),
            PipelineConfig {
                annotate: false,
                ..PipelineConfig::default()
            },
        );

        let output = pipeline.process(&frame(1));
        assert!(output.annotated.is_none());
        assert_eq!(output.observations.len(), 1);
    }

    #[test]
    fn test_class_labels() {
        assert_eq!(class_label(3), "motorcycle");
        assert_eq!(class_label(42), "class_42");
    }
}
