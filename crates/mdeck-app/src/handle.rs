//! Cloneable request handle for the coordinator
//!
//! Callers outside the event loop (CLI, signal handlers, integration tests)
//! talk to the coordinator exclusively through this handle.

use tokio::sync::{mpsc, oneshot};

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, LogEntry, PresenceEvent};

use crate::message::{Message, Snapshot};

/// Sends requests to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    msg_tx: mpsc::Sender<Message>,
}

impl CoordinatorHandle {
    pub fn new(msg_tx: mpsc::Sender<Message>) -> Self {
        Self { msg_tx }
    }

    /// Start a session and wait for the launch to resolve.
    pub async fn start(&self, device_id: impl Into<DeviceId>, args: Vec<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Start {
            device_id: device_id.into(),
            args,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Stop a session and wait for its process to be terminated.
    ///
    /// Stopping a device with no session succeeds immediately.
    pub async fn stop(&self, device_id: impl Into<DeviceId>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Stop {
            device_id: device_id.into(),
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    pub async fn refresh(&self) -> Result<()> {
        self.send(Message::Refresh).await
    }

    pub async fn select(&self, device_id: impl Into<DeviceId>) -> Result<()> {
        self.send(Message::Select(device_id.into())).await
    }

    pub async fn deselect(&self, device_id: impl Into<DeviceId>) -> Result<()> {
        self.send(Message::Deselect(device_id.into())).await
    }

    /// Forward a presence batch, e.g. from a platform-specific watcher
    pub async fn presence(&self, event: PresenceEvent) -> Result<()> {
        self.send(Message::Presence(event)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Snapshot(tx)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn device_logs(&self, device_id: impl Into<DeviceId>) -> Result<Vec<LogEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::DeviceLogs {
            device_id: device_id.into(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn system_logs(&self) -> Result<Vec<LogEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(Message::SystemLogs(tx)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Whether the coordinator has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.msg_tx.is_closed()
    }

    async fn send(&self, msg: Message) -> Result<()> {
        let label = msg.label();
        self.msg_tx
            .send(msg)
            .await
            .map_err(|_| Error::channel_send(format!("coordinator gone, dropped {}", label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, rx) = message::channel();
        let handle = CoordinatorHandle::new(tx);
        drop(rx);

        assert!(handle.is_closed());
        assert!(matches!(handle.refresh().await, Err(Error::ChannelSend { .. })));
        assert!(matches!(handle.start("A", vec![]).await, Err(Error::ChannelSend { .. })));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_channel_closed() {
        let (tx, mut rx) = message::channel();
        let handle = CoordinatorHandle::new(tx);

        let responder = tokio::spawn(async move {
            // Receive and drop without answering
            let msg = rx.recv().await;
            assert!(matches!(msg, Some(Message::Stop { .. })));
        });

        let err = tokio_test::assert_err!(handle.stop("A").await);
        responder.await.unwrap();
        assert!(matches!(err, Error::ChannelClosed));
    }
}
