//! Application state
//!
//! Holds configuration and the shared engine components

use crate::alert_hub::{AlertHub, AlertHubConfig, DedupScope, DEFAULT_DEDUP_WINDOW, DEFAULT_SUBSCRIBER_BUFFER};
use crate::camera_directory::CameraDirectory;
use crate::camera_supervisor::CameraSupervisor;
use crate::detection_pipeline::{PipelineConfig, DEFAULT_DETECTION_THRESHOLD, DEFAULT_TARGET_CLASSES};
use crate::detection_sink::{DetectionSink, DEFAULT_SINK_CAPACITY};
use crate::error::{Error, Result};
use crate::live_state::LiveStateStore;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Cap on concurrently running camera workers
    pub max_cameras: usize,
    /// Minimum detection confidence
    pub detection_threshold: f32,
    /// Source connect timeout
    pub connect_timeout: Duration,
    /// Detector class ids treated as vehicles
    pub target_classes: Vec<u32>,
    pub dedup_window: usize,
    pub dedup_scope: DedupScope,
    pub subscriber_buffer: usize,
    /// Keep annotated frames in live state
    pub annotate_frames: bool,
    pub capture_width: u32,
    pub capture_height: u32,
    /// JSONL event log; memory ring buffer when unset
    pub sink_path: Option<PathBuf>,
    pub sink_capacity: usize,
    /// Remote inference server base URL
    pub inference_url: String,
    pub inference_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_cameras: 5,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            connect_timeout: Duration::from_secs(10),
            target_classes: DEFAULT_TARGET_CLASSES.to_vec(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            dedup_scope: DedupScope::Global,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            annotate_frames: true,
            capture_width: 1280,
            capture_height: 720,
            sink_path: None,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            inference_url: "http://localhost:9000".to_string(),
            inference_timeout: Duration::from_secs(10),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl AppConfig {
    /// Load from process environment (call after dotenvy)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            max_cameras: parse_or(&get, "MAX_CAMERAS", defaults.max_cameras)?,
            detection_threshold: parse_or(&get, "DETECTION_THRESHOLD", defaults.detection_threshold)?,
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "RTSP_TIMEOUT",
                defaults.connect_timeout.as_secs(),
            )?),
            target_classes: match get("TARGET_CLASSES") {
                Some(raw) => parse_class_list(&raw)?,
                None => defaults.target_classes,
            },
            dedup_window: parse_or(&get, "DEDUP_WINDOW", defaults.dedup_window)?,
            dedup_scope: match get("DEDUP_SCOPE") {
                Some(raw) => raw.parse()?,
                None => defaults.dedup_scope,
            },
            subscriber_buffer: parse_or(&get, "SUBSCRIBER_BUFFER", defaults.subscriber_buffer)?,
            annotate_frames: match get("ANNOTATE_FRAMES") {
                Some(raw) => parse_bool("ANNOTATE_FRAMES", &raw)?,
                None => defaults.annotate_frames,
            },
            capture_width: parse_or(&get, "CAPTURE_WIDTH", defaults.capture_width)?,
            capture_height: parse_or(&get, "CAPTURE_HEIGHT", defaults.capture_height)?,
            sink_path: get("SINK_PATH").map(PathBuf::from),
            sink_capacity: parse_or(&get, "SINK_CAPACITY", defaults.sink_capacity)?,
            inference_url: get("INFERENCE_URL").unwrap_or(defaults.inference_url),
            inference_timeout: Duration::from_secs(parse_or(
                &get,
                "INFERENCE_TIMEOUT",
                defaults.inference_timeout.as_secs(),
            )?),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_cameras == 0 {
            return Err(Error::Config("MAX_CAMERAS must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(Error::Config(format!(
                "DETECTION_THRESHOLD must be within 0..=1, got {}",
                self.detection_threshold
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("RTSP_TIMEOUT must be at least 1 second".to_string()));
        }
        if self.target_classes.is_empty() {
            return Err(Error::Config("TARGET_CLASSES must not be empty".to_string()));
        }
        if self.dedup_window == 0 || self.subscriber_buffer == 0 || self.sink_capacity == 0 {
            return Err(Error::Config(
                "DEDUP_WINDOW, SUBSCRIBER_BUFFER and SINK_CAPACITY must be positive".to_string(),
            ));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(Error::Config("Capture size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            detection_threshold: self.detection_threshold,
            target_classes: self.target_classes.clone(),
            annotate: self.annotate_frames,
        }
    }

    pub fn alert_hub_config(&self) -> AlertHubConfig {
        AlertHubConfig {
            dedup_window: self.dedup_window,
            dedup_scope: self.dedup_scope,
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{}='{}': expected a boolean", key, raw))),
    }
}

fn parse_class_list(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| Error::Config(format!("TARGET_CLASSES entry '{}': {}", s, e)))
        })
        .collect()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Camera worker supervisor
    pub supervisor: Arc<CameraSupervisor>,
    /// Camera metadata
    pub directory: Arc<dyn CameraDirectory>,
    /// Latest result per camera
    pub live_state: Arc<LiveStateStore>,
    /// Durable event store
    pub sink: Arc<dyn DetectionSink>,
    /// Target alerts
    pub alerts: AlertHub,
    pub started_at: Instant,
}
