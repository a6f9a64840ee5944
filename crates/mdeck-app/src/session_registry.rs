//! Authoritative device -> running session mapping

use std::collections::HashMap;

use chrono::{DateTime, Local};

use mdeck_core::prelude::*;
use mdeck_core::DeviceId;

use crate::services::ProcessHandle;

/// One running mirroring session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub device_id: DeviceId,
    pub launch_args: Vec<String>,
    pub handle: ProcessHandle,
    pub started_at: DateTime<Local>,
}

/// A launch that has been handed to the launcher but not completed yet.
#[derive(Debug)]
struct LaunchTicket {
    ticket: u64,
    args: Vec<String>,
    /// Set by stop or disconnect while the launch is in flight
    stop_requested: bool,
}

/// What the coordinator must do with a finished launch
#[derive(Debug)]
pub enum LaunchResolution {
    /// Session installed
    Installed(SessionState),
    /// A stop arrived during the launch; the new process must be terminated
    Cancelled(ProcessHandle),
    /// The launcher failed; nothing was installed
    Failed(Error),
    /// The ticket is unknown (already resolved); ignore
    Stale,
}

/// What the coordinator must do for a stop request
#[derive(Debug)]
pub enum StopAction {
    /// Nothing running or launching; no collaborator call
    NotRunning,
    /// A launch is in flight; it will cancel itself on completion
    CancelPending,
    /// Session removed; terminate its process
    Terminate(SessionState),
}

/// Device -> session map plus in-flight launches.
///
/// Externally a device is either running or stopped. In-flight launches are
/// tracked separately so a second start is rejected and a stop can mark
/// intent without exposing a "starting" state.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DeviceId, SessionState>,
    launching: HashMap<DeviceId, LaunchTicket>,
    next_ticket: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a start and reserve a launch ticket.
    ///
    /// `AlreadyRunning` if a session exists or a launch is in flight;
    /// `DeviceNotAvailable` if the device is not present.
    pub fn begin_start(
        &mut self,
        device_id: &DeviceId,
        args: Vec<String>,
        available: bool,
    ) -> Result<u64> {
        if self.sessions.contains_key(device_id) || self.launching.contains_key(device_id) {
            return Err(Error::already_running(device_id));
        }
        if !available {
            return Err(Error::device_not_available(device_id));
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.launching.insert(
            device_id.clone(),
            LaunchTicket {
                ticket,
                args,
                stop_requested: false,
            },
        );
        debug!("Launch ticket {} issued for {}", ticket, device_id);
        Ok(ticket)
    }

    /// Resolve a launch once the launcher has answered.
    ///
    /// `still_available` is re-checked by the caller at completion time; a
    /// device that vanished during the launch is treated like a stop.
    pub fn complete_start(
        &mut self,
        device_id: &DeviceId,
        ticket: u64,
        result: Result<ProcessHandle>,
        still_available: bool,
    ) -> LaunchResolution {
        let pending = match self.launching.get(device_id) {
            Some(pending) if pending.ticket == ticket => self.launching.remove(device_id),
            _ => None,
        };
        let Some(pending) = pending else {
            return match result {
                Ok(handle) => LaunchResolution::Cancelled(handle),
                Err(_) => LaunchResolution::Stale,
            };
        };

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => return LaunchResolution::Failed(e),
        };

        if pending.stop_requested || !still_available {
            return LaunchResolution::Cancelled(handle);
        }

        let state = SessionState {
            device_id: device_id.clone(),
            launch_args: pending.args,
            handle,
            started_at: Local::now(),
        };
        self.sessions.insert(device_id.clone(), state.clone());
        LaunchResolution::Installed(state)
    }

    /// Handle a stop request. Removes the session immediately if present.
    pub fn begin_stop(&mut self, device_id: &DeviceId) -> StopAction {
        if let Some(state) = self.sessions.remove(device_id) {
            return StopAction::Terminate(state);
        }
        if let Some(pending) = self.launching.get_mut(device_id) {
            pending.stop_requested = true;
            return StopAction::CancelPending;
        }
        StopAction::NotRunning
    }

    /// Remove the session for `device_id` unconditionally. Idempotent.
    pub fn on_process_exited(
        &mut self,
        device_id: &DeviceId,
        exit_code: Option<i32>,
    ) -> Option<SessionState> {
        let removed = self.sessions.remove(device_id);
        if removed.is_some() {
            debug!("Session for {} ended (exit code {:?})", device_id, exit_code);
        }
        removed
    }

    pub fn session(&self, device_id: &DeviceId) -> Option<&SessionState> {
        self.sessions.get(device_id)
    }

    pub fn is_running(&self, device_id: &DeviceId) -> bool {
        self.sessions.contains_key(device_id)
    }

    pub fn is_launching(&self, device_id: &DeviceId) -> bool {
        self.launching.contains_key(device_id)
    }

    /// Whether `handle_id` belongs to the device's current session
    pub fn is_current_handle(&self, device_id: &DeviceId, handle_id: u64) -> bool {
        self.sessions
            .get(device_id)
            .is_some_and(|s| s.handle.id == handle_id)
    }

    /// Running device ids, sorted
    pub fn running_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove every session and mark every launch for cancellation
    pub fn drain(&mut self) -> Vec<SessionState> {
        for pending in self.launching.values_mut() {
            pending.stop_requested = true;
        }
        let mut states: Vec<SessionState> = self.sessions.drain().map(|(_, s)| s).collect();
        states.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        states
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
