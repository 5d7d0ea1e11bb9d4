//! Scripted frame sources for dry runs and tests
//!
//! Each registered URI maps to a `SourceScript` describing frame count,
//! frame size, pacing and injected failures.

use super::{Frame, FrameSource, SourceOpener};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour of one scripted source
#[derive(Debug, Clone)]
pub struct SourceScript {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    /// Sleep before each frame (simulates capture rate)
    pub frame_delay: Duration,
    /// Sleep before the open resolves (simulates a slow connect)
    pub open_delay: Duration,
    pub fail_open: bool,
    /// Read error instead of this frame sequence
    pub fail_read_at: Option<u64>,
}

impl SourceScript {
    pub fn frames(frames: u64) -> Self {
        Self {
            frames,
            width: 64,
            height: 48,
            frame_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            fail_open: false,
            fail_read_at: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_open: true,
            ..Self::frames(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_read_error_at(mut self, sequence: u64) -> Self {
        self.fail_read_at = Some(sequence);
        self
    }
}

/// Opener over a fixed URI -> script table
#[derive(Debug, Default)]
pub struct ScriptedOpener {
    scripts: HashMap<String, SourceScript>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    connecting: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, uri: &str, script: SourceScript) -> Self {
        self.scripts.insert(uri.to_string(), script);
        self
    }

    /// Sources successfully opened so far
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sources dropped so far
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Open attempts that have neither resolved nor been cancelled
    pub fn connecting_count(&self) -> usize {
        self.connecting.load(Ordering::SeqCst)
    }
}

/// Counts one open attempt for as long as it is alive
struct ConnectAttempt(Arc<AtomicUsize>);

impl ConnectAttempt {
    fn start(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceOpener for ScriptedOpener {
    async fn open(&self, camera_id: &str, uri: &str) -> Result<Box<dyn FrameSource>> {
        let script = self
            .scripts
            .get(uri)
            .ok_or_else(|| Error::source_error(camera_id, format!("unknown source {}", uri)))?;

        let _attempt = ConnectAttempt::start(&self.connecting);
        if !script.open_delay.is_zero() {
            tokio::time::sleep(script.open_delay).await;
        }

        if script.fail_open {
            return Err(Error::source_error(camera_id, "connection refused"));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            camera_id: camera_id.to_string(),
            script: script.clone(),
            next: 1,
            released: self.released.clone(),
        }))
    }
}

struct ScriptedSource {
    camera_id: String,
    script: SourceScript,
    next: u64,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.next > self.script.frames {
            return Ok(None);
        }
        if !self.script.frame_delay.is_zero() {
            tokio::time::sleep(self.script.frame_delay).await;
        }
        if self.script.fail_read_at == Some(self.next) {
            return Err(Error::source_error(&self.camera_id, "stream reset"));
        }

        let frame = Frame::new(
            self.next,
            RgbImage::new(self.script.width, self.script.height),
        );
        self.next += 1;
        Ok(Some(frame))
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
