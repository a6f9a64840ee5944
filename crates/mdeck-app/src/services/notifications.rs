//! Notification sinks
//!
//! `TracingNotificationSink` is always available and simply logs. The
//! desktop sink is behind the `desktop-notifications` feature.

use mdeck_core::prelude::*;

use super::NotificationSink;

/// Logs notifications through `tracing` instead of showing them
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    async fn is_permission_granted(&self) -> bool {
        true
    }

    async fn send_notification(&self, title: &str, body: &str) -> Result<()> {
        info!(target: "mdeck_app::notification", "{}: {}", title, body);
        Ok(())
    }
}

/// OS desktop notifications via `notify-rust`
#[cfg(feature = "desktop-notifications")]
#[derive(Debug, Clone)]
pub struct DesktopNotificationSink {
    app_name: String,
}

#[cfg(feature = "desktop-notifications")]
impl DesktopNotificationSink {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[cfg(feature = "desktop-notifications")]
impl Default for DesktopNotificationSink {
    fn default() -> Self {
        Self::new("Mirror Deck")
    }
}

#[cfg(feature = "desktop-notifications")]
impl NotificationSink for DesktopNotificationSink {
    async fn is_permission_granted(&self) -> bool {
        // freedesktop and Windows toasts have no runtime permission prompt
        true
    }

    async fn send_notification(&self, title: &str, body: &str) -> Result<()> {
        let app_name = self.app_name.clone();
        let summary = title.to_string();
        let body = body.to_string();

        // `show()` blocks on D-Bus / the OS notification center
        tokio::task::spawn_blocking(move || {
            let mut notification = notify_rust::Notification::new();
            notification.appname(&app_name).summary(&summary).body(&body);
            notification.show().map(|_| ()).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| Error::notification_delivery(e.to_string()))?
        .map_err(Error::notification_delivery)
    }
}

/// The sink selected at startup from `[notifications] desktop`
#[derive(Debug, Clone)]
pub enum HostNotificationSink {
    Tracing(TracingNotificationSink),
    #[cfg(feature = "desktop-notifications")]
    Desktop(DesktopNotificationSink),
}

impl HostNotificationSink {
    /// Pick the desktop sink when requested and compiled in.
    pub fn select(desktop: bool) -> Self {
        #[cfg(feature = "desktop-notifications")]
        if desktop {
            return Self::Desktop(DesktopNotificationSink::default());
        }

        if desktop {
            warn!("Desktop notifications requested but not compiled in; logging instead");
        }
        Self::Tracing(TracingNotificationSink)
    }
}

impl NotificationSink for HostNotificationSink {
    async fn is_permission_granted(&self) -> bool {
        match self {
            Self::Tracing(sink) => sink.is_permission_granted().await,
            #[cfg(feature = "desktop-notifications")]
            Self::Desktop(sink) => sink.is_permission_granted().await,
        }
    }

    async fn send_notification(&self, title: &str, body: &str) -> Result<()> {
        match self {
            Self::Tracing(sink) => sink.send_notification(title, body).await,
            #[cfg(feature = "desktop-notifications")]
            Self::Desktop(sink) => sink.send_notification(title, body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_sink_always_delivers() {
        let sink = TracingNotificationSink;
        assert!(sink.is_permission_granted().await);
        assert!(sink.send_notification("Install failed", "/a.apk on D1").await.is_ok());
    }

    #[cfg(not(feature = "desktop-notifications"))]
    #[test]
    fn test_select_falls_back_to_tracing() {
        assert!(matches!(
            HostNotificationSink::select(true),
            HostNotificationSink::Tracing(_)
        ));
    }

    #[test]
    fn test_select_tracing_when_not_requested() {
        assert!(matches!(
            HostNotificationSink::select(false),
            HostNotificationSink::Tracing(_)
        ));
    }
}
