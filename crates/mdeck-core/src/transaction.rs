//! Install/push transaction types reconstructed from mirroring logs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DeviceId;

/// The two operations a mirroring session can perform on a dropped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// APK installation
    Install,
    /// File push to device storage
    Push,
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Install => "Install",
            TransactionKind::Push => "Push",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Install => write!(f, "install"),
            TransactionKind::Push => write!(f, "push"),
        }
    }
}

/// Terminal outcome of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Tag used in notification dedup keys
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// A single classified log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    InstallRequested {
        path: String,
    },
    InstallSucceeded {
        path: String,
    },
    InstallFailed {
        path: String,
    },
    /// Low-level diagnostic from the wrapped adb tool
    AdbInstallFailed {
        path: String,
        detail: Option<String>,
    },
    PushRequested {
        path: String,
    },
    PushSucceeded {
        path: String,
        dest: String,
    },
    PushFailed {
        path: String,
    },
    /// Low-level diagnostic from the wrapped adb tool
    AdbPushFailed {
        path: String,
        detail: Option<String>,
    },
}

impl ParsedEvent {
    pub fn kind(&self) -> TransactionKind {
        match self {
            ParsedEvent::InstallRequested { .. }
            | ParsedEvent::InstallSucceeded { .. }
            | ParsedEvent::InstallFailed { .. }
            | ParsedEvent::AdbInstallFailed { .. } => TransactionKind::Install,
            ParsedEvent::PushRequested { .. }
            | ParsedEvent::PushSucceeded { .. }
            | ParsedEvent::PushFailed { .. }
            | ParsedEvent::AdbPushFailed { .. } => TransactionKind::Push,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ParsedEvent::InstallRequested { path }
            | ParsedEvent::InstallSucceeded { path }
            | ParsedEvent::InstallFailed { path }
            | ParsedEvent::AdbInstallFailed { path, .. }
            | ParsedEvent::PushRequested { path }
            | ParsedEvent::PushSucceeded { path, .. }
            | ParsedEvent::PushFailed { path }
            | ParsedEvent::AdbPushFailed { path, .. } => path,
        }
    }
}

/// The tracker's in-flight half of a transaction awaiting its terminal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub resource_path: String,
    pub failure_detail: Option<String>,
}

impl PendingTransaction {
    pub fn new(resource_path: impl Into<String>) -> Self {
        Self {
            resource_path: resource_path.into(),
            failure_detail: None,
        }
    }
}

/// A transaction whose terminal line has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedTransaction {
    pub device_id: DeviceId,
    pub kind: TransactionKind,
    pub resource_path: String,
    pub outcome: Outcome,
    /// Failure detail for failures, push destination for push successes
    pub detail: Option<String>,
}

impl CompletedTransaction {
    /// Dedup key identifying the notification for this transaction
    pub fn notification_key(&self) -> NotificationKey {
        NotificationKey {
            device_id: self.device_id.clone(),
            resource_path: self.resource_path.clone(),
            outcome: self.outcome,
        }
    }

    /// Notification title, e.g. "Install failed"
    pub fn title(&self) -> String {
        match self.outcome {
            Outcome::Success => format!("{} succeeded", self.kind.label()),
            Outcome::Failure => format!("{} failed", self.kind.label()),
        }
    }

    /// Notification body, e.g. "/a.apk on R58M123: INSTALL_FAILED_..."
    pub fn body(&self) -> String {
        let mut body = format!("{} on {}", self.resource_path, self.device_id);
        match (self.outcome, &self.detail) {
            (Outcome::Failure, Some(detail)) => {
                body.push_str(": ");
                body.push_str(detail);
            }
            (Outcome::Success, Some(dest)) => {
                body.push_str(" -> ");
                body.push_str(dest);
            }
            _ => {}
        }
        body
    }
}

/// Identifies a notification as "already sent".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationKey {
    pub device_id: DeviceId,
    pub resource_path: String,
    pub outcome: Outcome,
}

impl NotificationKey {
    pub fn new(
        device_id: impl Into<DeviceId>,
        resource_path: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            resource_path: resource_path.into(),
            outcome,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.device_id,
            self.resource_path,
            self.outcome.tag()
        )
    }
}
