//! Test doubles shared by unit tests

use crate::detection_sink::DetectionSink;
use crate::error::{Error, Result};
use crate::frame_source::Frame;
use crate::inference_client::{CapabilityError, Classifier, Detector};
use crate::models::{DetectionEvent, RawDetection};
use async_trait::async_trait;
use image::RgbImage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Detector returning fixed detections per frame sequence
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    by_frame: HashMap<u64, Vec<RawDetection>>,
    fail_on: HashSet<u64>,
    panic_on: HashSet<u64>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(mut self, sequence: u64, detections: Vec<RawDetection>) -> Self {
        self.by_frame.insert(sequence, detections);
        self
    }

    pub fn failing_on(mut self, sequence: u64) -> Self {
        self.fail_on.insert(sequence);
        self
    }

    pub fn panicking_on(mut self, sequence: u64) -> Self {
        self.panic_on.insert(sequence);
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> std::result::Result<Vec<RawDetection>, CapabilityError> {
        if self.panic_on.contains(&frame.sequence) {
            panic!("detector crashed on frame {}", frame.sequence);
        }
        if self.fail_on.contains(&frame.sequence) {
            return Err(CapabilityError::Request("model offline".to_string()));
        }
        Ok(self.by_frame.get(&frame.sequence).cloned().unwrap_or_default())
    }
}

/// Detector that always fails
pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> std::result::Result<Vec<RawDetection>, CapabilityError> {
        Err(CapabilityError::Request("connection refused".to_string()))
    }
}

/// Classifier with a fixed verdict that counts its calls
#[derive(Debug)]
pub struct FixedClassifier {
    verdict: bool,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
    panic_on_call: Option<usize>,
}

impl FixedClassifier {
    pub fn new(verdict: bool) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            panic_on_call: None,
        }
    }

    /// Fail the n-th call (1-based)
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Panic on the n-th call (1-based)
    pub fn panicking_on_call(mut self, call: usize) -> Self {
        self.panic_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _crop: &RgbImage) -> std::result::Result<bool, CapabilityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on_call == Some(call) {
            panic!("classifier crashed on call {}", call);
        }
        if self.fail_on_call == Some(call) {
            return Err(CapabilityError::Response("bad crop".to_string()));
        }
        Ok(self.verdict)
    }
}

/// Sink whose writes always fail
pub struct FailingSink;

#[async_trait]
impl DetectionSink for FailingSink {
    async fn append(&self, _event: &DetectionEvent) -> Result<()> {
        Err(Error::Persistence("disk full".to_string()))
    }

    async fn query(&self, _camera_id: Option<&str>, _limit: usize) -> Result<Vec<DetectionEvent>> {
        Ok(Vec::new())
    }
}
