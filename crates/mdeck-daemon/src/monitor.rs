//! Device presence polling
//!
//! The host gives no push notification for adb devices, so presence is
//! derived by enumerating on an interval and diffing consecutive snapshots.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, PresenceEvent};

/// Default interval between `adb devices` polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Compare two device snapshots.
///
/// Returns `(added, removed)`, each sorted and free of duplicates.
pub fn diff_device_sets(
    previous: &[DeviceId],
    current: &[DeviceId],
) -> (Vec<DeviceId>, Vec<DeviceId>) {
    let previous: BTreeSet<&DeviceId> = previous.iter().collect();
    let current: BTreeSet<&DeviceId> = current.iter().collect();

    let added = current
        .difference(&previous)
        .map(|d| (*d).clone())
        .collect();
    let removed = previous
        .difference(&current)
        .map(|d| (*d).clone())
        .collect();

    (added, removed)
}

/// Turn a snapshot diff into the non-empty presence batches it implies.
///
/// Disconnects come first so a device that vanished is torn down before
/// any new arrivals trigger a refresh.
pub fn presence_events(previous: &[DeviceId], current: &[DeviceId]) -> Vec<PresenceEvent> {
    let (added, removed) = diff_device_sets(previous, current);
    let mut events = Vec::with_capacity(2);
    if !removed.is_empty() {
        events.push(PresenceEvent::Disconnected(removed));
    }
    if !added.is_empty() {
        events.push(PresenceEvent::Connected(added));
    }
    events
}

/// Background presence poller.
///
/// Diffs each poll against a snapshot that follows the consumer's applied
/// device set: whenever `applied` changes, the monitor adopts it, so a
/// device the consumer dropped is announced again on the next poll that
/// still lists it.
pub struct PresenceMonitor {
    handle: JoinHandle<()>,
}

impl PresenceMonitor {
    /// Spawn the poll loop.
    ///
    /// `enumerate` is called once per tick. A failed enumeration is treated
    /// as "no change": the previous snapshot is kept and nothing is emitted.
    /// The loop exits when `shutdown_rx` flips to `true` or the event
    /// receiver is dropped.
    pub fn spawn<F, Fut>(
        poll_interval: Duration,
        mut enumerate: F,
        event_tx: mpsc::Sender<PresenceEvent>,
        mut applied: watch::Receiver<Vec<DeviceId>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<DeviceId>>> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut snapshot: Vec<DeviceId> = applied.borrow_and_update().clone();

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Presence monitor shutting down");
                            break;
                        }
                        continue;
                    }
                }

                let current = match enumerate().await {
                    Ok(devices) => devices,
                    Err(e) => {
                        debug!("Device enumeration failed, keeping last snapshot: {}", e);
                        continue;
                    }
                };

                if applied.has_changed().unwrap_or(false) {
                    snapshot = applied.borrow_and_update().clone();
                    trace!("Adopted applied device set: {:?}", snapshot);
                }

                for event in presence_events(&snapshot, &current) {
                    debug!("Presence change: {:?}", event);
                    if event_tx.send(event).await.is_err() {
                        debug!("Presence receiver dropped, stopping monitor");
                        return;
                    }
                }
                snapshot = current;
            }
        });

        Self { handle }
    }

    /// Whether the poll loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the poll loop without waiting for the next tick
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
