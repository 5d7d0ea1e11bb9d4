//! ffmpeg-backed frame source
//!
//! Decodes any ffmpeg-readable URI (rtsp://, http://, files) into a raw
//! rgb24 pipe at a fixed capture resolution.

use super::{Frame, FrameSource, SourceOpener};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// Opens sources by spawning one ffmpeg decoder per camera
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    width: u32,
    height: u32,
    connect_timeout: Duration,
}

impl FfmpegOpener {
    pub fn new(width: u32, height: u32, connect_timeout: Duration) -> Self {
        Self {
            width,
            height,
            connect_timeout,
        }
    }

    fn build_command(&self, uri: &str) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        if uri.starts_with("rtsp://") {
            // -rtsp_transport tcp: more reliable than UDP on lossy links
            // -timeout: socket I/O timeout in microseconds
            let timeout_us = self.connect_timeout.as_micros().to_string();
            cmd.args(["-rtsp_transport", "tcp", "-timeout", &timeout_us]);
        }

        let scale = format!("scale={}:{}", self.width, self.height);
        cmd.args(["-i", uri, "-an", "-vf", &scale])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // Dropping the source (or a cancelled open) SIGKILLs the decoder
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SourceOpener for FfmpegOpener {
    async fn open(&self, camera_id: &str, uri: &str) -> Result<Box<dyn FrameSource>> {
        let mut child = self
            .build_command(uri)
            .spawn()
            .map_err(|e| Error::source_error(camera_id, format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::source_error(camera_id, "ffmpeg stdout unavailable"))?;

        let mut source = FfmpegSource {
            camera_id: camera_id.to_string(),
            _child: child,
            stdout,
            width: self.width,
            height: self.height,
            sequence: 0,
            pending: None,
        };

        // The stream counts as open once the first frame decodes
        match source.decode_next().await? {
            Some(frame) => {
                source.pending = Some(frame);
                tracing::debug!(camera_id = %camera_id, "ffmpeg source opened");
                Ok(Box::new(source))
            }
            None => Err(Error::source_error(
                camera_id,
                "ffmpeg produced no frames (unreachable or unsupported source)",
            )),
        }
    }
}

struct FfmpegSource {
    camera_id: String,
    /// Held for kill_on_drop
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    sequence: u64,
    pending: Option<Frame>,
}

impl FfmpegSource {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    async fn decode_next(&mut self) -> Result<Option<Frame>> {
        let mut buf = vec![0u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            // A truncated trailing frame is treated as end of stream
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(Error::source_error(
                    &self.camera_id,
                    format!("frame read failed: {}", e),
                ))
            }
        }

        self.sequence += 1;
        Frame::from_rgb24(self.sequence, self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| Error::source_error(&self.camera_id, "frame size mismatch"))
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.decode_next().await
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        tracing::debug!(camera_id = %self.camera_id, "ffmpeg source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_rtsp_uses_tcp_transport() {
        let opener = FfmpegOpener::new(1280, 720, Duration::from_secs(10));
        let args = args_of(&opener.build_command("rtsp://10.0.0.5/stream1"));

        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(args.windows(2).any(|w| w == ["-timeout", "10000000"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "scale=1280:720"]));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[tokio::test]
    async fn test_open_failure_reports_source_error() {
        let opener = FfmpegOpener::new(64, 48, Duration::from_secs(1));

        // Either ffmpeg is missing or it cannot read the path; both fail the open
        let result = opener.open("cam1", "/nonexistent/vehicle-watch.mp4").await;
        assert!(matches!(result, Err(Error::Source { .. })));
    }

    #[test]
    fn test_file_source_has_no_rtsp_options() {
        let opener = FfmpegOpener::new(640, 480, Duration::from_secs(5));
        let args = args_of(&opener.build_command("/var/video/lot.mp4"));

        assert!(!args.iter().any(|a| a == "-rtsp_transport"));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
    }
}
