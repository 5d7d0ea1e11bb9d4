//! Append-only JSON Lines sink

use super::{clamp_limit, DetectionSink};
use crate::error::{Error, Result};
use crate::models::DetectionEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One JSON document per line, appended in arrival order
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DetectionSink for JsonlSink {
    async fn append(&self, event: &DetectionEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))?;

        let persist = |e: std::io::Error| Error::Persistence(format!("{}: {}", self.path.display(), e));
        file.write_all(&line).await.map_err(persist)?;
        // tokio finishes writes in the background unless flushed
        file.flush().await.map_err(persist)?;
        Ok(())
    }

    async fn query(&self, camera_id: Option<&str>, limit: usize) -> Result<Vec<DetectionEvent>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Persistence(format!("{}: {}", self.path.display(), e))),
        };

        let mut events = Vec::new();
        for line in contents.lines().rev() {
            if events.len() >= clamp_limit(limit) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DetectionEvent>(line) {
                Ok(event) if camera_id.map_or(true, |id| event.camera_id == id) => {
                    events.push(event)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Skipping malformed sink line");
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vehicle-watch-{}-{}.jsonl", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let path = temp_path("append");
        let sink = JsonlSink::new(&path);

        for i in 1..=4 {
            let camera_id = if i % 2 == 0 { "cam2" } else { "cam1" };
            sink.append(&DetectionEvent::new(camera_id, i, 64, 48, Vec::new()))
                .await
                .unwrap();
        }

        let cam1 = sink.query(Some("cam1"), 10).await.unwrap();
        let frames: Vec<u64> = cam1.iter().map(|e| e.frame_index).collect();
        assert_eq!(frames, vec![3, 1]);

        let latest = sink.query(None, 1).await.unwrap();
        assert_eq!(latest[0].frame_index, 4);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_append_is_on_disk_when_it_returns() {
        let path = temp_path("durable");
        let sink = JsonlSink::new(&path);

        for i in 1..=50 {
            sink.append(&DetectionEvent::new("cam1", i, 64, 48, Vec::new()))
                .await
                .unwrap();
            // Read outside tokio so nothing can still be in flight
            let contents = std::fs::read_to_string(&path).unwrap();
            assert_eq!(contents.lines().count() as u64, i);
        }

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let sink = JsonlSink::new(temp_path("missing"));
        assert!(sink.query(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let path = temp_path("malformed");
        let sink = JsonlSink::new(&path);
        sink.append(&DetectionEvent::new("cam1", 1, 64, 48, Vec::new()))
            .await
            .unwrap();
        tokio::fs::write(
            &path,
            format!("{}not json\n", tokio::fs::read_to_string(&path).await.unwrap()),
        )
        .await
        .unwrap();

        let events = sink.query(None, 10).await.unwrap();
        assert_eq!(events.len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_path_is_persistence_error() {
        let sink = JsonlSink::new("/nonexistent-dir/vehicle-watch/events.jsonl");
        let result = sink
            .append(&DetectionEvent::new("cam1", 1, 64, 48, Vec::new()))
            .await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }
}
