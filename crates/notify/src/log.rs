//! Session-scoped, append-only notification log.

use crate::notification::Notification;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered list of received notifications, shared between the receive task
/// and any number of readers. Appending is the only mutation.
#[derive(Clone, Debug, Default)]
pub struct NotificationLog {
    entries: Arc<RwLock<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in arrival order. Holds the write lock only for the push.
    pub async fn append(&self, notification: Notification) {
        self.entries.write().await.push(notification);
    }

    /// Copy of every entry received so far.
    pub async fn snapshot(&self) -> Vec<Notification> {
        self.entries.read().await.clone()
    }

    /// Entries at or after `offset`, for readers polling incrementally.
    pub async fn since(&self, offset: usize) -> Vec<Notification> {
        let entries = self.entries.read().await;
        entries.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
