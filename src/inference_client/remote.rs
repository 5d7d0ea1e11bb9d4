//! Remote inference adapter
//!
//! Sends JPEG-encoded images to an HTTP inference server:
//!
//! - `POST {base_url}/v1/detect`   -> `{"detections": [{"bbox": [x1,y1,x2,y2], "confidence": f, "class_id": n}]}`
//! - `POST {base_url}/v1/classify` -> `{"is_target": bool}`

use super::{CapabilityError, Classifier, Detector};
use crate::frame_source::Frame;
use crate::models::{BBox, RawDetection};
use image::{ImageFormat, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<DetectionDto>,
}

#[derive(Debug, Deserialize)]
struct DetectionDto {
    bbox: [f32; 4],
    confidence: f32,
    class_id: u32,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    is_target: bool,
}

/// Shared HTTP client for both capabilities
pub struct RemoteInferenceClient {
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
}

impl RemoteInferenceClient {
    /// Create new client; must be called inside the tokio runtime
    pub fn new(base_url: String, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime: Handle::current(),
        })
    }

    /// Blocking POST of one JPEG image; returns the response body
    fn post_image(&self, path: &str, image: &RgbImage) -> Result<String, CapabilityError> {
        let jpeg = encode_jpeg(image)?;
        let url = format!("{}{}", self.base_url, path);

        self.runtime.block_on(async {
            let part = Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str(JPEG_MIME)
                .map_err(|e| CapabilityError::Request(e.to_string()))?;
            let form = Form::new().part("image", part);

            let response = self
                .client
                .post(&url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| CapabilityError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(CapabilityError::Request(format!("{} returned {}", url, status)));
            }

            response
                .text()
                .await
                .map_err(|e| CapabilityError::Response(e.to_string()))
        })
    }
}

/// Detector backed by the remote inference server
pub struct RemoteDetector {
    client: Arc<RemoteInferenceClient>,
}

impl RemoteDetector {
    pub fn new(client: Arc<RemoteInferenceClient>) -> Self {
        Self { client }
    }
}

impl Detector for RemoteDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>, CapabilityError> {
        let body = self.client.post_image("/v1/detect", frame.image())?;
        parse_detections(&body)
    }
}

/// Classifier backed by the remote inference server
pub struct RemoteClassifier {
    client: Arc<RemoteInferenceClient>,
}

impl RemoteClassifier {
    pub fn new(client: Arc<RemoteInferenceClient>) -> Self {
        Self { client }
    }
}

impl Classifier for RemoteClassifier {
    fn classify(&self, crop: &RgbImage) -> Result<bool, CapabilityError> {
        let body = self.client.post_image("/v1/classify", crop)?;
        parse_verdict(&body)
    }
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, CapabilityError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| CapabilityError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Parse detector output; coordinates are truncated to integer pixels
fn parse_detections(body: &str) -> Result<Vec<RawDetection>, CapabilityError> {
    let response: DetectResponse =
        serde_json::from_str(body).map_err(|e| CapabilityError::Response(e.to_string()))?;

    Ok(response
        .detections
        .into_iter()
        .map(|d| RawDetection {
            bbox: BBox::new(d.bbox[0] as i32, d.bbox[1] as i32, d.bbox[2] as i32, d.bbox[3] as i32),
            confidence: d.confidence,
            class_id: d.class_id,
        })
        .collect())
}

fn parse_verdict(body: &str) -> Result<bool, CapabilityError> {
    let response: ClassifyResponse =
        serde_json::from_str(body).map_err(|e| CapabilityError::Response(e.to_string()))?;
    Ok(response.is_target)
}
