//! Subscriber handles

use super::types::Alert;
use super::HubShared;
use futures::Stream;
use std::sync::Weak;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Receiving end of one subscription; unregisters on drop
#[derive(Debug)]
pub struct AlertSubscription {
    id: Uuid,
    receiver: broadcast::Receiver<Alert>,
    /// Resolves with an error once the hub forgets this subscriber
    revoked: watch::Receiver<()>,
    dropped: u64,
    hub: Weak<HubShared>,
}

impl AlertSubscription {
    pub(crate) fn new(
        id: Uuid,
        receiver: broadcast::Receiver<Alert>,
        revoked: watch::Receiver<()>,
        hub: Weak<HubShared>,
    ) -> Self {
        Self {
            id,
            receiver,
            revoked,
            dropped: 0,
            hub,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn is_revoked(&self) -> bool {
        self.revoked.has_changed().is_err()
    }

    fn record_lag(&mut self, missed: u64) {
        self.dropped += missed;
        tracing::warn!(subscriber_id = %self.id, missed, "Alert subscriber lagging, oldest alerts dropped");
    }

    /// Next alert; `None` once unsubscribed, or once the hub has closed
    /// and the buffer is drained
    pub async fn recv(&mut self) -> Option<Alert> {
        if self.is_revoked() {
            return None;
        }
        loop {
            tokio::select! {
                biased;
                _ = self.revoked.changed() => return None,
                received = self.receiver.recv() => match received {
                    Ok(alert) => return Some(alert),
                    Err(RecvError::Lagged(missed)) => self.record_lag(missed),
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Buffered alert, if any
    pub fn try_recv(&mut self) -> Option<Alert> {
        if self.is_revoked() {
            return None;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(alert) => return Some(alert),
                Err(TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Alerts discarded because this subscriber fell behind (counted as
    /// the gap is observed)
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stream of alerts; the subscription lives as long as the stream
    pub fn into_stream(self) -> impl Stream<Item = Alert> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|alert| (alert, subscription))
        })
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove_subscriber(&self.id);
        }
    }
}
