//! Notification deduplication and bounded delivery

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;

use mdeck_core::prelude::*;
use mdeck_core::NotificationKey;

use crate::services::NotificationSink;

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    PermissionDenied,
    Failed(String),
    /// The sink did not answer within the send timeout
    Abandoned,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Ask the sink for permission, then send, all within `timeout`.
///
/// Never fails: every problem is folded into the returned outcome, and a
/// timeout counts as abandoned rather than failed.
pub async fn deliver<N: NotificationSink>(
    sink: &N,
    title: &str,
    body: &str,
    timeout: Duration,
) -> DeliveryOutcome {
    let attempt = async {
        if !sink.is_permission_granted().await {
            return Err(Error::NotificationPermissionDenied);
        }
        sink.send_notification(title, body).await
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(Error::NotificationPermissionDenied)) => DeliveryOutcome::PermissionDenied,
        Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
        Err(_) => DeliveryOutcome::Abandoned,
    }
}

/// Remembers every notification key ever emitted.
///
/// Membership is permanent for the process lifetime. A failed delivery does
/// not un-record its key, so a sink that keeps failing cannot cause a storm
/// of retries for the same event.
#[derive(Debug, Default)]
pub struct NotificationDeduplicator {
    notified: HashSet<NotificationKey>,
}

impl NotificationDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`. Returns `true` only the first time a key is seen.
    pub fn claim(&mut self, key: &NotificationKey) -> bool {
        if self.notified.contains(key) {
            trace!("Notification {} already sent", key);
            return false;
        }
        self.notified.insert(key.clone());
        true
    }

    /// Claim `key` and, if it is new, deliver through `sink`.
    ///
    /// Returns `None` when the key was already notified (no sink call).
    pub async fn notify<N: NotificationSink>(
        &mut self,
        sink: &N,
        key: &NotificationKey,
        title: &str,
        body: &str,
        timeout: Duration,
    ) -> Option<DeliveryOutcome> {
        if !self.claim(key) {
            return None;
        }
        Some(deliver(sink, title, body, timeout).await)
    }

    pub fn contains(&self, key: &NotificationKey) -> bool {
        self.notified.contains(key)
    }

    pub fn len(&self) -> usize {
        self.notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notified.is_empty()
    }
}
