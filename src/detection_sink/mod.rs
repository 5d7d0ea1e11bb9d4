//! DetectionSink - Durable Event Store
//!
//! ## Responsibilities
//!
//! - Append one DetectionEvent per processed frame
//! - Query recent events, newest first, optionally per camera
//!
//! Delivery is at-most-once: workers log append failures and drop the event.

mod jsonl;
mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use crate::error::Result;
use crate::models::DetectionEvent;
use async_trait::async_trait;

/// Upper bound for query limits
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default memory sink capacity
pub const DEFAULT_SINK_CAPACITY: usize = 2000;

/// Clamp a requested limit to `1..=MAX_QUERY_LIMIT`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}

/// Persistence sink for detection events
#[async_trait]
pub trait DetectionSink: Send + Sync {
    async fn append(&self, event: &DetectionEvent) -> Result<()>;

    /// Newest-first events; `limit` is clamped by implementations
    async fn query(&self, camera_id: Option<&str>, limit: usize) -> Result<Vec<DetectionEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(5000), MAX_QUERY_LIMIT);
    }
}
