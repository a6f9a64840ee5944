//! Transaction tracker
//!
//! Correlates install/push request lines with their terminal success or
//! failure lines. The log format carries no transaction id, so correlation
//! is by device and transaction kind, with the most recent request winning.
//!
//! Overlapping transactions of the same kind on one device can misattribute
//! failure detail to the wrong path. That is a property of the log format.

use std::collections::HashMap;

use mdeck_core::{
    CompletedTransaction, DeviceId, Outcome, ParsedEvent, PendingTransaction, TransactionKind,
};

/// Per-(device, kind) pending-state store
#[derive(Debug, Default)]
pub struct TransactionTracker {
    pending: HashMap<(DeviceId, TransactionKind), PendingTransaction>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed event for `device_id`, in arrival order.
    ///
    /// Returns the transaction completed by this event, if any.
    pub fn apply(
        &mut self,
        device_id: &DeviceId,
        event: ParsedEvent,
    ) -> Option<CompletedTransaction> {
        let key = (device_id.clone(), event.kind());

        match event {
            ParsedEvent::InstallRequested { path } | ParsedEvent::PushRequested { path } => {
                // Overwrites any earlier, never-terminated request
                self.pending.insert(key, PendingTransaction::new(path));
                None
            }

            ParsedEvent::InstallSucceeded { path } => {
                self.pending.remove(&key);
                Some(Self::completed(key, path, Outcome::Success, None))
            }

            ParsedEvent::PushSucceeded { path, dest } => {
                self.pending.remove(&key);
                Some(Self::completed(key, path, Outcome::Success, Some(dest)))
            }

            ParsedEvent::InstallFailed { path } | ParsedEvent::PushFailed { path } => {
                let detail = self
                    .pending
                    .remove(&key)
                    .and_then(|pending| pending.failure_detail);
                Some(Self::completed(key, path, Outcome::Failure, detail))
            }

            ParsedEvent::AdbInstallFailed { path, detail }
            | ParsedEvent::AdbPushFailed { path, detail } => {
                let pending = self
                    .pending
                    .entry(key)
                    .or_insert_with(|| PendingTransaction::new(path));
                if detail.is_some() {
                    pending.failure_detail = detail;
                }
                None
            }
        }
    }

    fn completed(
        (device_id, kind): (DeviceId, TransactionKind),
        resource_path: String,
        outcome: Outcome,
        detail: Option<String>,
    ) -> CompletedTransaction {
        CompletedTransaction {
            device_id,
            kind,
            resource_path,
            outcome,
            detail,
        }
    }

    /// The pending record for (device, kind), if any
    pub fn pending(&self, device_id: &DeviceId, kind: TransactionKind) -> Option<&PendingTransaction> {
        self.pending.get(&(device_id.clone(), kind))
    }

    /// Drop every pending record for a device (used on disconnect)
    pub fn clear_device(&mut self, device_id: &DeviceId) {
        self.pending.retain(|(id, _), _| id != device_id);
    }

    /// Total number of pending records across all devices
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
