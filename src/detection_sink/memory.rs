//! In-memory ring buffer sink

use super::{clamp_limit, DetectionSink, DEFAULT_SINK_CAPACITY};
use crate::error::Result;
use crate::models::DetectionEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

struct EventRing {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
}

impl EventRing {
    fn push(&mut self, event: DetectionEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn latest(&self, camera_id: Option<&str>, count: usize) -> Vec<DetectionEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| camera_id.map_or(true, |id| e.camera_id == id))
            .take(count)
            .cloned()
            .collect()
    }
}

/// Bounded sink keeping the most recent events
pub struct MemorySink {
    ring: RwLock<EventRing>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: RwLock::new(EventRing {
                events: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    pub async fn count(&self) -> usize {
        self.ring.read().await.events.len()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_SINK_CAPACITY)
    }
}

#[async_trait]
impl DetectionSink for MemorySink {
    async fn append(&self, event: &DetectionEvent) -> Result<()> {
        self.ring.write().await.push(event.clone());
        tracing::trace!(camera_id = %event.camera_id, event_id = %event.id, "Event stored");
        Ok(())
    }

    async fn query(&self, camera_id: Option<&str>, limit: usize) -> Result<Vec<DetectionEvent>> {
        let ring = self.ring.read().await;
        Ok(ring.latest(camera_id, clamp_limit(limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(camera_id: &str, frame_index: u64) -> DetectionEvent {
        DetectionEvent::new(camera_id, frame_index, 64, 48, Vec::new())
    }

    #[tokio::test]
    async fn test_query_newest_first_per_camera() {
        let sink = MemorySink::new(100);
        for i in 1..=5 {
            sink.append(&event("cam1", i)).await.unwrap();
            sink.append(&event("cam2", i)).await.unwrap();
        }

        let events = sink.query(Some("cam1"), 3).await.unwrap();
        let frames: Vec<u64> = events.iter().map(|e| e.frame_index).collect();
        assert_eq!(frames, vec![5, 4, 3]);
        assert!(events.iter().all(|e| e.camera_id == "cam1"));

        assert_eq!(sink.query(None, 100).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let sink = MemorySink::new(3);
        for i in 1..=5 {
            sink.append(&event("cam1", i)).await.unwrap();
        }

        assert_eq!(sink.count().await, 3);
        let events = sink.query(None, 10).await.unwrap();
        assert_eq!(events.last().unwrap().frame_index, 3);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_one() {
        let sink = MemorySink::default();
        sink.append(&event("cam1", 1)).await.unwrap();
        sink.append(&event("cam1", 2)).await.unwrap();

        assert_eq!(sink.query(None, 0).await.unwrap().len(), 1);
    }
}
