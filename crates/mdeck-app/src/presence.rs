//! Device presence reconciliation
//!
//! Holds the available and selected device sets. Session teardown for
//! vanished devices is driven by the coordinator, which owns the registry.

use std::collections::BTreeSet;

use mdeck_core::DeviceId;
use mdeck_daemon::diff_device_sets;

/// Difference between the current available set and a fresh enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshDiff {
    pub added: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
}

impl RefreshDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Available/selected sets plus refresh generation tracking
#[derive(Debug, Default)]
pub struct PresenceReconciler {
    available: BTreeSet<DeviceId>,
    selected: BTreeSet<DeviceId>,
    /// Generation of the most recently requested refresh
    refresh_generation: u64,
}

impl PresenceReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add connected devices. Returns the ids that were not already present.
    pub fn on_connected(&mut self, device_ids: &[DeviceId]) -> Vec<DeviceId> {
        device_ids
            .iter()
            .filter(|id| self.available.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Remove disconnected devices from the available and selected sets.
    ///
    /// Returns the ids that were actually available.
    pub fn on_disconnected(&mut self, device_ids: &[DeviceId]) -> Vec<DeviceId> {
        device_ids
            .iter()
            .filter(|id| {
                self.selected.remove(*id);
                self.available.remove(*id)
            })
            .cloned()
            .collect()
    }

    /// Start a refresh and return its generation
    pub fn begin_refresh(&mut self) -> u64 {
        self.refresh_generation += 1;
        self.refresh_generation
    }

    /// Whether `generation` is the newest requested refresh
    pub fn is_current_refresh(&self, generation: u64) -> bool {
        generation == self.refresh_generation
    }

    /// Compare a fresh enumeration against the available set.
    ///
    /// Does not mutate: removals must go through the disconnect path so
    /// running sessions are torn down.
    pub fn diff(&self, enumerated: &[DeviceId]) -> RefreshDiff {
        let current: Vec<DeviceId> = self.available.iter().cloned().collect();
        let (added, removed) = diff_device_sets(&current, enumerated);
        RefreshDiff { added, removed }
    }

    /// Select an available device. Returns `false` if it is not available.
    pub fn select(&mut self, device_id: &DeviceId) -> bool {
        if !self.available.contains(device_id) {
            return false;
        }
        self.selected.insert(device_id.clone());
        true
    }

    pub fn deselect(&mut self, device_id: &DeviceId) -> bool {
        self.selected.remove(device_id)
    }

    pub fn is_available(&self, device_id: &DeviceId) -> bool {
        self.available.contains(device_id)
    }

    /// Available ids, sorted
    pub fn available(&self) -> Vec<DeviceId> {
        self.available.iter().cloned().collect()
    }

    /// Selected ids, sorted
    pub fn selected(&self) -> Vec<DeviceId> {
        self.selected.iter().cloned().collect()
    }
}
