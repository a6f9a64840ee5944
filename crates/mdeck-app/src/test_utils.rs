//! In-memory collaborators for driving the coordinator without adb or scrcpy
//!
//! Each fake is `Clone` and shares its state, so a test keeps one clone to
//! script and inspect while the coordinator owns the other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, ProcessEvent};

use crate::message::Message;
use crate::services::{DeviceEnumerator, NotificationSink, ProcessHandle, SessionLauncher};

// ─────────────────────────────────────────────────────────
// Enumerator
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EnumeratorState {
    devices: Vec<DeviceId>,
    scripted: VecDeque<Vec<DeviceId>>,
    error: Option<String>,
    calls: usize,
}

/// Enumerator returning a scripted device list
#[derive(Debug, Clone, Default)]
pub struct FakeEnumerator {
    state: Arc<Mutex<EnumeratorState>>,
}

impl FakeEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(ids: &[&str]) -> Self {
        let fake = Self::new();
        fake.set_devices(ids.iter().map(|s| DeviceId::from(*s)).collect());
        fake
    }

    /// Replace the device list and clear any scripted failure
    pub fn set_devices(&self, devices: Vec<DeviceId>) {
        let mut state = self.state.lock().unwrap();
        state.devices = devices;
        state.error = None;
    }

    /// Answer the next enumerations with `results`, in order, before
    /// falling back to the device list
    pub fn script(&self, results: Vec<Vec<DeviceId>>) {
        self.state.lock().unwrap().scripted.extend(results);
    }

    /// Make every following enumeration fail
    pub fn fail_with(&self, message: &str) {
        self.state.lock().unwrap().error = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl DeviceEnumerator for FakeEnumerator {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceId>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some(devices) = state.scripted.pop_front() {
            return Ok(devices);
        }
        match &state.error {
            Some(message) => Err(Error::process(message.clone())),
            None => Ok(state.devices.clone()),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Launcher
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LauncherState {
    next_id: u64,
    launched: Vec<(DeviceId, Vec<String>)>,
    live: HashMap<DeviceId, ProcessHandle>,
    terminated: Vec<ProcessHandle>,
    launch_error: Option<String>,
    terminate_error: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

/// Launcher that records calls instead of spawning processes.
///
/// `hold_launches` parks every following launch until `release_launches`,
/// which is how tests put a stop or disconnect in the middle of a start.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
    msg_tx: Option<mpsc::Sender<Message>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher able to post process events to a coordinator via [`Self::emit`]
    pub fn with_events(msg_tx: mpsc::Sender<Message>) -> Self {
        Self {
            state: Arc::default(),
            msg_tx: Some(msg_tx),
        }
    }

    pub fn fail_launches(&self, message: &str) {
        self.state.lock().unwrap().launch_error = Some(message.to_string());
    }

    pub fn fail_terminations(&self, message: &str) {
        self.state.lock().unwrap().terminate_error = Some(message.to_string());
    }

    pub fn hold_launches(&self) {
        self.state.lock().unwrap().gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_launches(&self) {
        if let Some(gate) = self.state.lock().unwrap().gate.take() {
            gate.close();
        }
    }

    /// Every launch call, in order, with the args it received
    pub fn launched(&self) -> Vec<(DeviceId, Vec<String>)> {
        self.state.lock().unwrap().launched.clone()
    }

    /// Every terminate call, in order
    pub fn terminated(&self) -> Vec<ProcessHandle> {
        self.state.lock().unwrap().terminated.clone()
    }

    /// Handle of the most recent live process for a device
    pub fn live_handle(&self, device_id: &DeviceId) -> Option<ProcessHandle> {
        self.state.lock().unwrap().live.get(device_id).cloned()
    }

    /// Post a process event for the device's live process.
    ///
    /// Returns `false` if there is no live process or no event channel.
    pub async fn emit(&self, device_id: &DeviceId, event: ProcessEvent) -> bool {
        let Some(msg_tx) = &self.msg_tx else {
            return false;
        };
        let Some(handle) = self.live_handle(device_id) else {
            return false;
        };
        if matches!(event, ProcessEvent::Exited { .. }) {
            self.state.lock().unwrap().live.remove(device_id);
        }
        msg_tx
            .send(Message::Process {
                device_id: device_id.clone(),
                handle_id: handle.id,
                event,
            })
            .await
            .is_ok()
    }

    pub async fn emit_line(&self, device_id: &DeviceId, line: &str) -> bool {
        self.emit(device_id, ProcessEvent::Stdout(line.to_string()))
            .await
    }
}

impl SessionLauncher for FakeLauncher {
    async fn launch_session(&self, device_id: &DeviceId, args: &[String]) -> Result<ProcessHandle> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.launched.push((device_id.clone(), args.to_vec()));
            state.gate.clone()
        };
        if let Some(gate) = gate {
            // Closed on release
            let _ = gate.acquire().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.launch_error {
            return Err(Error::launch_failure(message.clone()));
        }
        state.next_id += 1;
        let handle = ProcessHandle::new(state.next_id, Some(40_000 + state.next_id as u32));
        state.live.insert(device_id.clone(), handle.clone());
        Ok(handle)
    }

    async fn terminate_session(&self, handle: &ProcessHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.terminated.push(handle.clone());
        state.live.retain(|_, live| live.id != handle.id);
        match &state.terminate_error {
            Some(message) => Err(Error::termination_failure(message.clone())),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Notification sink
// ─────────────────────────────────────────────────────────

/// Sink that records delivered notifications
#[derive(Debug, Clone)]
pub struct FakeNotificationSink {
    granted: bool,
    error: Option<String>,
    delay: Option<Duration>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for FakeNotificationSink {
    fn default() -> Self {
        Self {
            granted: true,
            error: None,
            delay: None,
            sent: Arc::default(),
        }
    }
}

impl FakeNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Delay every send by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(title, body)` of every delivered notification
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationSink for FakeNotificationSink {
    async fn is_permission_granted(&self) -> bool {
        self.granted
    }

    async fn send_notification(&self, title: &str, body: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(Error::notification_delivery(message.clone()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
