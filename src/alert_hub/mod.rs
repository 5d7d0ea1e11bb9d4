//! AlertHub - Target Alert De-duplication and Fan-out
//!
//! ## Responsibilities
//!
//! - Turn DetectionEvents with targets into alerts
//! - Suppress repeats within a bounded window of recent event ids
//! - Deliver each alert to every live subscriber without blocking producers
//!
//! Fan-out is a bounded broadcast channel; a slow subscriber loses its
//! oldest alerts and never delays workers or other subscribers.

mod dedup;
mod subscription;
mod types;

pub use dedup::{DedupTracker, DedupWindow};
pub use subscription::AlertSubscription;
pub use types::{Alert, AlertKind, DedupScope, DEFAULT_DEDUP_WINDOW, DEFAULT_SUBSCRIBER_BUFFER};

use crate::models::DetectionEvent;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Alert hub settings
#[derive(Debug, Clone, Copy)]
pub struct AlertHubConfig {
    pub dedup_window: usize,
    pub dedup_scope: DedupScope,
    /// Per-subscriber backlog (rounded up to a power of two)
    pub subscriber_buffer: usize,
}

impl Default for AlertHubConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            dedup_scope: DedupScope::Global,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

#[derive(Debug)]
pub(crate) struct HubShared {
    /// `None` once the hub is closed
    sender: RwLock<Option<broadcast::Sender<Alert>>>,
    /// Live subscribers; dropping the entry revokes the subscription
    subscribers: DashMap<Uuid, watch::Sender<()>>,
}

impl HubShared {
    fn remove_subscriber(&self, id: &Uuid) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            tracing::info!(subscriber_id = %id, "Alert subscriber disconnected");
        }
        removed
    }
}

/// AlertHub instance (cheap to clone)
#[derive(Debug, Clone)]
pub struct AlertHub {
    shared: Arc<HubShared>,
    dedup: Arc<Mutex<DedupTracker>>,
    alerts_emitted: Arc<AtomicU64>,
}

impl AlertHub {
    pub fn new(config: AlertHubConfig) -> Self {
        let (sender, _) = broadcast::channel(config.subscriber_buffer.max(1));
        Self {
            shared: Arc::new(HubShared {
                sender: RwLock::new(Some(sender)),
                subscribers: DashMap::new(),
            }),
            dedup: Arc::new(Mutex::new(DedupTracker::new(
                config.dedup_scope,
                config.dedup_window,
            ))),
            alerts_emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an alert for `event` if it has targets and is not a repeat
    pub fn submit(&self, event: &DetectionEvent) -> Option<Alert> {
        let alert = Alert::from_event(event)?;

        let fresh = {
            let mut dedup = self
                .dedup
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            dedup.check_and_record(&event.camera_id, event.id)
        };
        if !fresh {
            tracing::debug!(camera_id = %event.camera_id, event_id = %event.id, "Duplicate alert suppressed");
            return None;
        }

        self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        self.broadcast(&alert);

        tracing::info!(
            camera_id = %alert.camera_id,
            event_id = %alert.event_id,
            confidence = alert.confidence,
            "Target alert emitted"
        );
        Some(alert)
    }

    fn broadcast(&self, alert: &Alert) {
        let sender = self
            .shared
            .sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sender) = sender.as_ref() {
            // No receivers is not an error
            let _ = sender.send(alert.clone());
        }
    }

    /// Register a new subscriber; already closed if the hub is
    pub fn subscribe(&self) -> AlertSubscription {
        let id = Uuid::new_v4();
        let (revoke, revoked) = watch::channel(());

        let receiver = {
            let sender = self
                .shared
                .sender
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match sender.as_ref() {
                Some(sender) => {
                    self.shared.subscribers.insert(id, revoke);
                    tracing::info!(subscriber_id = %id, "Alert subscriber connected");
                    sender.subscribe()
                }
                None => {
                    tracing::debug!(subscriber_id = %id, "Alert hub closed, subscription ends immediately");
                    let (_, receiver) = broadcast::channel(1);
                    receiver
                }
            }
        };

        AlertSubscription::new(id, receiver, revoked, Arc::downgrade(&self.shared))
    }

    /// Remove a subscriber; its handle then yields `None`
    pub fn unsubscribe(&self, id: &Uuid) -> bool {
        self.shared.remove_subscriber(id)
    }

    /// Drop per-camera dedup state for a removed camera
    pub fn forget_camera(&self, camera_id: &str) {
        self.dedup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .forget_camera(camera_id);
    }

    /// Close the hub (shutdown); subscribers drain their backlog, then end
    pub fn close(&self) {
        let closed = self
            .shared
            .sender
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if closed.is_some() {
            tracing::info!(subscribers = self.subscriber_count(), "Alert hub closed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted.load(Ordering::Relaxed)
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new(AlertHubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BBox, VehicleObservation};
    use futures::StreamExt;
    use std::time::Duration;

    fn event(camera_id: &str, targets: usize) -> DetectionEvent {
        let observations = (0..targets)
            .map(|_| VehicleObservation {
                bbox: BBox::new(0, 0, 20, 20),
                confidence: 0.88,
                class_label: "car".to_string(),
                is_target: true,
            })
            .collect();
        DetectionEvent::new(camera_id, 1, 640, 480, observations)
    }

    #[tokio::test]
    async fn test_no_alert_for_zero_targets() {
        let hub = AlertHub::default();
        let mut subscription = hub.subscribe();

        assert!(hub.submit(&event("cam1", 0)).is_none());
        assert!(subscription.try_recv().is_none());
        assert_eq!(hub.alerts_emitted(), 0);
    }

    #[tokio::test]
    async fn test_resubmitted_event_alerts_once() {
        let hub = AlertHub::default();
        let mut subscription = hub.subscribe();
        let target = event("cam1", 2);

        assert!(hub.submit(&target).is_some());
        assert!(hub.submit(&target).is_none());
        assert!(hub.submit(&target).is_none());

        let alert = subscription.recv().await.unwrap();
        assert_eq!(alert.camera_id, "cam1");
        assert!(subscription.try_recv().is_none());
        assert_eq!(hub.alerts_emitted(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = AlertHub::default();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.submit(&event("cam1", 1));

        assert!(first.recv().await.is_some());
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_drop_unregisters_subscriber() {
        let hub = AlertHub::default();
        let subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);

        // Delivery to nobody is not an error
        assert!(hub.submit(&event("cam1", 1)).is_some());
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_recv() {
        let hub = AlertHub::default();
        let mut subscription = hub.subscribe();

        assert!(hub.unsubscribe(&subscription.id()));
        assert!(subscription.recv().await.is_none());
        assert!(!hub.unsubscribe(&subscription.id()));
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_oldest() {
        let hub = AlertHub::new(AlertHubConfig {
            subscriber_buffer: 2,
            ..AlertHubConfig::default()
        });
        let mut subscription = hub.subscribe();

        for camera in ["cam1", "cam2", "cam3"] {
            hub.submit(&event(camera, 1));
        }

        assert_eq!(subscription.recv().await.unwrap().camera_id, "cam2");
        assert_eq!(subscription.recv().await.unwrap().camera_id, "cam3");
        assert_eq!(subscription.dropped(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_open_subscriptions() {
        let hub = AlertHub::default();
        let mut subscription = hub.subscribe();

        hub.submit(&event("cam1", 1));
        hub.close();

        assert_eq!(subscription.recv().await.unwrap().camera_id, "cam1");
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_already_closed() {
        let hub = AlertHub::default();
        hub.close();

        let mut subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 0);

        // Submissions after close reach nobody
        assert!(hub.submit(&event("cam1", 1)).is_some());
        let next = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_stream_delivers_alerts() {
        let hub = AlertHub::default();
        let stream = hub.subscribe().into_stream();
        tokio::pin!(stream);

        let producer = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.submit(&event("cam7", 1));
        });

        let alert = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alert.camera_id, "cam7");
    }
}
