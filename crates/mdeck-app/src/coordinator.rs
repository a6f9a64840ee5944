//! Coordinator - single owner of session, presence and transaction state
//!
//! All state lives in one struct driven by one message channel. Each message
//! is handled synchronously in `process_message`; anything that can suspend
//! (enumeration, launch, terminate, notification delivery) is spawned and
//! reports back with a completion message, where preconditions are checked
//! again against current state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use mdeck_core::prelude::*;
use mdeck_core::{
    CompletedTransaction, DeviceId, LogEntry, LogLevel, NotificationKey, Outcome,
    PendingTransaction, PresenceEvent, ProcessEvent, TransactionKind,
};
use mdeck_daemon::{parse_log_line, PresenceMonitor};

use crate::config::Settings;
use crate::coordinator_event::{CoordinatorEvent, StopReason};
use crate::dedup::{deliver, DeliveryOutcome, NotificationDeduplicator};
use crate::handle::CoordinatorHandle;
use crate::log_buffers::LogBuffers;
use crate::message::{Message, Reply, Snapshot};
use crate::presence::PresenceReconciler;
use crate::services::{DeviceEnumerator, NotificationSink, ProcessHandle, SessionLauncher};
use crate::session_registry::{LaunchResolution, SessionRegistry, SessionState, StopAction};
use crate::tracker::TransactionTracker;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Device session and log-event coordinator.
///
/// Generic over its three collaborators so tests can drive it with fakes.
pub struct Coordinator<E, L, N> {
    enumerator: Arc<E>,
    launcher: Arc<L>,
    sink: Arc<N>,
    settings: Settings,

    registry: SessionRegistry,
    presence: PresenceReconciler,
    tracker: TransactionTracker,
    dedup: NotificationDeduplicator,
    logs: LogBuffers,

    /// Sender half of the message channel; cloned into spawned work.
    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,

    event_tx: broadcast::Sender<CoordinatorEvent>,
    /// Last published available set; the presence monitor diffs against it
    applied_tx: watch::Sender<Vec<DeviceId>>,

    /// Set by `Message::Shutdown`; the loop exits after the current step
    shutting_down: bool,
    /// Sessions drained by shutdown, terminated when the loop exits
    shutdown_sessions: Vec<SessionState>,
}

impl<E, L, N> Coordinator<E, L, N>
where
    E: DeviceEnumerator + Send + Sync + 'static,
    L: SessionLauncher + Send + Sync + 'static,
    N: NotificationSink + Send + Sync + 'static,
{
    /// Create a coordinator around an existing message channel.
    ///
    /// See [`crate::message::channel`].
    pub fn new(
        enumerator: E,
        launcher: L,
        sink: N,
        settings: Settings,
        (msg_tx, msg_rx): (mpsc::Sender<Message>, mpsc::Receiver<Message>),
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            enumerator: Arc::new(enumerator),
            launcher: Arc::new(launcher),
            sink: Arc::new(sink),
            settings,
            registry: SessionRegistry::new(),
            presence: PresenceReconciler::new(),
            tracker: TransactionTracker::new(),
            dedup: NotificationDeduplicator::new(),
            logs: LogBuffers::default(),
            msg_tx,
            msg_rx,
            event_tx,
            applied_tx: watch::channel(Vec::new()).0,
            shutting_down: false,
            shutdown_sessions: Vec::new(),
        }
    }

    /// Subscribe to coordinator events.
    ///
    /// Lagging subscribers lose the oldest events
    /// (`broadcast::error::RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    /// Cloneable request handle for UI/CLI callers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.msg_tx.clone())
    }

    /// Start polling for presence changes and feed them into this coordinator.
    pub fn spawn_presence_monitor(
        &self,
        poll_interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> PresenceMonitor {
        let (presence_tx, mut presence_rx) = mpsc::channel::<PresenceEvent>(16);
        let enumerator = Arc::clone(&self.enumerator);
        let monitor = PresenceMonitor::spawn(
            poll_interval,
            move || {
                let enumerator = Arc::clone(&enumerator);
                async move { enumerator.enumerate_devices().await }
            },
            presence_tx,
            self.applied_tx.subscribe(),
            shutdown_rx,
        );

        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = presence_rx.recv().await {
                if msg_tx.send(Message::Presence(event)).await.is_err() {
                    break;
                }
            }
        });

        monitor
    }

    // ─────────────────────────────────────────────────────────
    // Read-only Views
    // ─────────────────────────────────────────────────────────

    pub fn available_devices(&self) -> Vec<DeviceId> {
        self.presence.available()
    }

    pub fn running_devices(&self) -> Vec<DeviceId> {
        self.registry.running_devices()
    }

    pub fn selected_devices(&self) -> Vec<DeviceId> {
        self.presence.selected()
    }

    pub fn is_running(&self, device_id: &DeviceId) -> bool {
        self.registry.is_running(device_id)
    }

    pub fn session(&self, device_id: &DeviceId) -> Option<&SessionState> {
        self.registry.session(device_id)
    }

    pub fn device_logs(&self, device_id: &DeviceId) -> Vec<LogEntry> {
        self.logs.device(device_id)
    }

    pub fn system_logs(&self) -> Vec<LogEntry> {
        self.logs.system()
    }

    pub fn pending_transaction(
        &self,
        device_id: &DeviceId,
        kind: TransactionKind,
    ) -> Option<PendingTransaction> {
        self.tracker.pending(device_id, kind).cloned()
    }

    pub fn was_notified(&self, key: &NotificationKey) -> bool {
        self.dedup.contains(key)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            available: self.available_devices(),
            running: self.running_devices(),
            selected: self.selected_devices(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    // ─────────────────────────────────────────────────────────
    // Event Loop
    // ─────────────────────────────────────────────────────────

    /// Run until `Message::Shutdown`, then terminate remaining sessions.
    ///
    /// The coordinator holds a sender of its own channel, so the loop never
    /// sees the channel close; `Shutdown` is the only way out.
    pub async fn run(mut self) {
        info!("Coordinator started");
        while !self.shutting_down {
            if !self.step().await {
                break;
            }
        }
        self.finish_shutdown().await;
        info!("Coordinator stopped");
    }

    /// Receive and process one message.
    ///
    /// Returns `false` if the channel closed, which cannot happen while
    /// `self` holds `msg_tx`.
    pub async fn step(&mut self) -> bool {
        match self.msg_rx.recv().await {
            Some(msg) => {
                self.process_message(msg);
                true
            }
            None => false,
        }
    }

    /// Handle one message as a single non-preemptible state transition.
    pub fn process_message(&mut self, msg: Message) {
        trace!("Processing {}", msg.label());

        match msg {
            Message::Start {
                device_id,
                args,
                reply,
            } => self.handle_start(device_id, args, reply),
            Message::Stop { device_id, reply } => self.handle_stop(device_id, reply),
            Message::Refresh => self.trigger_refresh(),
            Message::Select(device_id) => {
                if !self.presence.select(&device_id) {
                    debug!("Ignoring selection of unavailable device {}", device_id);
                }
            }
            Message::Deselect(device_id) => {
                self.presence.deselect(&device_id);
            }
            Message::Shutdown => self.begin_shutdown(),

            Message::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Message::DeviceLogs { device_id, reply } => {
                let _ = reply.send(self.device_logs(&device_id));
            }
            Message::SystemLogs(reply) => {
                let _ = reply.send(self.system_logs());
            }

            Message::Presence(PresenceEvent::Connected(ids)) => self.handle_connected(ids),
            Message::Presence(PresenceEvent::Disconnected(ids)) => self.handle_disconnected(ids),
            Message::Process {
                device_id,
                handle_id,
                event,
            } => self.handle_process_event(device_id, handle_id, event),

            Message::LaunchCompleted {
                device_id,
                ticket,
                result,
                reply,
            } => self.handle_launch_completed(device_id, ticket, result, reply),
            Message::TerminateCompleted {
                device_id,
                handle,
                result,
                reply,
            } => self.handle_terminate_completed(device_id, handle, result, reply),
            Message::RefreshCompleted { generation, result } => {
                self.handle_refresh_completed(generation, result)
            }
            Message::NotificationCompleted { key, outcome } => {
                self.handle_notification_completed(key, outcome)
            }
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        trace!("Emitting {}", event.label());
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn system_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push_system(level, message);
    }

    // ─────────────────────────────────────────────────────────
    // Session Lifecycle
    // ─────────────────────────────────────────────────────────

    fn handle_start(&mut self, device_id: DeviceId, args: Vec<String>, reply: Option<Reply<()>>) {
        let args = self.settings.scrcpy.session_args(&args);
        let available = self.presence.is_available(&device_id);

        match self.registry.begin_start(&device_id, args.clone(), available) {
            Ok(ticket) => {
                info!("Starting session for {}", device_id);
                self.spawn_launch(device_id, ticket, args, reply);
            }
            Err(e) => {
                warn!("Start rejected for {}: {}", device_id, e);
                self.system_log(LogLevel::Warning, format!("Start rejected: {}", e));
                self.emit(CoordinatorEvent::StartFailed {
                    device_id,
                    error: e.to_string(),
                });
                respond(reply, Err(e));
            }
        }
    }

    fn spawn_launch(
        &self,
        device_id: DeviceId,
        ticket: u64,
        args: Vec<String>,
        reply: Option<Reply<()>>,
    ) {
        let launcher = Arc::clone(&self.launcher);
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let result = launcher.launch_session(&device_id, &args).await;
            let msg = Message::LaunchCompleted {
                device_id,
                ticket,
                result,
                reply,
            };
            if let Err(mpsc::error::SendError(msg)) = msg_tx.send(msg).await {
                // Coordinator is gone; nobody will ever own this process
                if let Message::LaunchCompleted {
                    result: Ok(handle), ..
                } = msg
                {
                    let _ = launcher.terminate_session(&handle).await;
                }
            }
        });
    }

    fn handle_launch_completed(
        &mut self,
        device_id: DeviceId,
        ticket: u64,
        result: Result<ProcessHandle>,
        reply: Option<Reply<()>>,
    ) {
        let still_available = self.presence.is_available(&device_id);

        match self
            .registry
            .complete_start(&device_id, ticket, result, still_available)
        {
            LaunchResolution::Installed(state) => {
                info!("Session started for {} (pid {:?})", device_id, state.handle.pid);
                self.system_log(LogLevel::Info, format!("Session started for {}", device_id));
                self.emit(CoordinatorEvent::SessionStarted {
                    device_id,
                    handle: state.handle,
                });
                respond(reply, Ok(()));
            }
            LaunchResolution::Cancelled(handle) => {
                info!("Launch for {} completed after a stop; terminating", device_id);
                self.system_log(
                    LogLevel::Info,
                    format!("Launch for {} cancelled by stop request", device_id),
                );
                let error = Error::launch_cancelled(device_id.clone());
                self.emit(CoordinatorEvent::StartFailed {
                    device_id: device_id.clone(),
                    error: error.to_string(),
                });
                self.spawn_terminate(device_id, handle, None);
                respond(reply, Err(error));
            }
            LaunchResolution::Failed(e) => {
                error!("Launch failed for {}: {}", device_id, e);
                self.system_log(
                    LogLevel::Error,
                    format!("Failed to start session for {}: {}", device_id, e),
                );
                self.emit(CoordinatorEvent::StartFailed {
                    device_id,
                    error: e.to_string(),
                });
                respond(reply, Err(e));
            }
            LaunchResolution::Stale => {
                debug!("Ignoring stale launch completion for {}", device_id);
                respond(reply, Err(Error::launch_cancelled(device_id)));
            }
        }
    }

    fn handle_stop(&mut self, device_id: DeviceId, reply: Option<Reply<()>>) {
        match self.registry.begin_stop(&device_id) {
            StopAction::NotRunning => {
                debug!("Stop for {} ignored: not running", device_id);
                respond(reply, Ok(()));
            }
            StopAction::CancelPending => {
                info!("Stop requested while {} is launching", device_id);
                self.system_log(
                    LogLevel::Info,
                    format!("Stop requested during launch for {}", device_id),
                );
                respond(reply, Ok(()));
            }
            StopAction::Terminate(state) => {
                info!("Stopping session for {}", device_id);
                self.emit(CoordinatorEvent::SessionStopped {
                    device_id: device_id.clone(),
                    reason: StopReason::Requested,
                });
                self.spawn_terminate(device_id, state.handle, reply);
            }
        }
    }

    fn spawn_terminate(&self, device_id: DeviceId, handle: ProcessHandle, reply: Option<Reply<()>>) {
        let launcher = Arc::clone(&self.launcher);
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let result = launcher.terminate_session(&handle).await;
            let _ = msg_tx
                .send(Message::TerminateCompleted {
                    device_id,
                    handle,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn handle_terminate_completed(
        &mut self,
        device_id: DeviceId,
        handle: ProcessHandle,
        result: Result<()>,
        reply: Option<Reply<()>>,
    ) {
        match result {
            Ok(()) => {
                debug!("Process {} for {} terminated", handle.id, device_id);
                respond(reply, Ok(()));
            }
            Err(e) => {
                let e = match e {
                    Error::TerminationFailure { .. } => e,
                    other => Error::termination_failure(other.to_string()),
                };
                warn!("Termination failed for {}: {}", device_id, e);
                self.system_log(
                    LogLevel::Warning,
                    format!("Failed to stop session for {}: {}", device_id, e),
                );
                respond(reply, Err(e));
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Process Output
    // ─────────────────────────────────────────────────────────

    fn handle_process_event(&mut self, device_id: DeviceId, handle_id: u64, event: ProcessEvent) {
        match event {
            ProcessEvent::Stdout(line) => self.handle_line(&device_id, &line, false),
            ProcessEvent::Stderr(line) => self.handle_line(&device_id, &line, true),
            ProcessEvent::Exited { code } => {
                if !self.registry.is_current_handle(&device_id, handle_id) {
                    debug!(
                        "Ignoring exit of superseded process {} for {}",
                        handle_id, device_id
                    );
                    return;
                }
                self.on_process_exited(&device_id, code);
            }
        }
    }

    /// Remove the device's session after its process exited. Idempotent.
    pub fn on_process_exited(&mut self, device_id: &DeviceId, code: Option<i32>) {
        if self.registry.on_process_exited(device_id, code).is_none() {
            return;
        }
        let reason = StopReason::Exited { code };
        self.system_log(
            LogLevel::Info,
            format!("Session for {} {}", device_id, reason.describe()),
        );
        self.emit(CoordinatorEvent::SessionStopped {
            device_id: device_id.clone(),
            reason,
        });
    }

    /// Retain, parse and correlate one output line.
    fn handle_line(&mut self, device_id: &DeviceId, line: &str, from_stderr: bool) {
        self.logs.push_line(device_id, line, from_stderr);

        let Some(parsed) = parse_log_line(line) else {
            return;
        };
        trace!("{}: {:?}", device_id, parsed);

        if let Some(completed) = self.tracker.apply(device_id, parsed) {
            self.handle_completed(completed);
        }
    }

    fn handle_completed(&mut self, completed: CompletedTransaction) {
        let title = completed.title();
        let body = completed.body();
        let level = match completed.outcome {
            Outcome::Success => LogLevel::Info,
            Outcome::Failure => LogLevel::Error,
        };
        info!("{}: {}", title, body);
        self.system_log(level, format!("{}: {}", title, body));

        let key = completed.notification_key();
        self.emit(CoordinatorEvent::TransactionCompleted(completed));

        if !self.settings.notifications.enabled {
            return;
        }
        if self.dedup.claim(&key) {
            self.spawn_notification(key, title, body);
        }
    }

    fn spawn_notification(&self, key: NotificationKey, title: String, body: String) {
        let sink = Arc::clone(&self.sink);
        let msg_tx = self.msg_tx.clone();
        let timeout = self.settings.notifications.send_timeout();

        tokio::spawn(async move {
            let outcome = deliver(sink.as_ref(), &title, &body, timeout).await;
            let _ = msg_tx
                .send(Message::NotificationCompleted { key, outcome })
                .await;
        });
    }

    fn handle_notification_completed(&mut self, key: NotificationKey, outcome: DeliveryOutcome) {
        match &outcome {
            DeliveryOutcome::Delivered => debug!("Notification {} delivered", key),
            DeliveryOutcome::PermissionDenied => {
                warn!("Notification permission denied");
                self.system_log(
                    LogLevel::Warning,
                    format!("Notification for {} not shown: {}", key, Error::NotificationPermissionDenied),
                );
            }
            DeliveryOutcome::Failed(message) => {
                warn!("Notification delivery failed: {}", message);
                self.system_log(
                    LogLevel::Warning,
                    format!(
                        "Notification for {} not shown: {}",
                        key,
                        Error::notification_delivery(message.clone())
                    ),
                );
            }
            DeliveryOutcome::Abandoned => {
                debug!("Notification {} abandoned after timeout", key);
                self.system_log(
                    LogLevel::Debug,
                    format!("Notification for {} timed out", key),
                );
            }
        }

        self.emit(CoordinatorEvent::NotificationDispatched { key, outcome });
    }

    // ─────────────────────────────────────────────────────────
    // Presence
    // ─────────────────────────────────────────────────────────

    fn handle_connected(&mut self, device_ids: Vec<DeviceId>) {
        let added = self.presence.on_connected(&device_ids);
        if !added.is_empty() {
            info!("Devices connected: {:?}", added);
            self.system_log(LogLevel::Info, format!("Connected: {}", join_ids(&added)));
            self.emit_devices_changed();
        }
        // Connect batches can be partial; confirm with a full enumeration
        self.trigger_refresh();
    }

    fn handle_disconnected(&mut self, device_ids: Vec<DeviceId>) {
        if self.disconnect_devices(&device_ids) {
            self.emit_devices_changed();
        }
        // Issued only after every removal and stop above
        self.trigger_refresh();
    }

    /// Remove devices and tear down anything they were running.
    ///
    /// Applies to every id in the batch, whether or not it was known to be
    /// available. Returns whether the available set changed.
    fn disconnect_devices(&mut self, device_ids: &[DeviceId]) -> bool {
        let removed = self.presence.on_disconnected(device_ids);
        if !removed.is_empty() {
            info!("Devices disconnected: {:?}", removed);
            self.system_log(
                LogLevel::Info,
                format!("Disconnected: {}", join_ids(&removed)),
            );
        }

        for device_id in device_ids {
            self.tracker.clear_device(device_id);

            match self.registry.begin_stop(device_id) {
                StopAction::Terminate(state) => {
                    self.emit(CoordinatorEvent::SessionStopped {
                        device_id: device_id.clone(),
                        reason: StopReason::Disconnected,
                    });
                    self.spawn_terminate(device_id.clone(), state.handle, None);
                }
                StopAction::CancelPending => {
                    debug!("{} disconnected during launch", device_id);
                }
                StopAction::NotRunning => {}
            }
        }

        !removed.is_empty()
    }

    fn trigger_refresh(&mut self) {
        let generation = self.presence.begin_refresh();
        let enumerator = Arc::clone(&self.enumerator);
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let result = enumerator.enumerate_devices().await;
            let _ = msg_tx
                .send(Message::RefreshCompleted { generation, result })
                .await;
        });
    }

    fn handle_refresh_completed(&mut self, generation: u64, result: Result<Vec<DeviceId>>) {
        if !self.presence.is_current_refresh(generation) {
            debug!("Dropping superseded refresh {}", generation);
            return;
        }

        let devices = match result {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device refresh failed: {}", e);
                self.system_log(LogLevel::Warning, format!("Device refresh failed: {}", e));
                return;
            }
        };

        let diff = self.presence.diff(&devices);
        let mut changed = false;
        if !diff.removed.is_empty() {
            changed |= self.disconnect_devices(&diff.removed);
        }
        if !diff.added.is_empty() {
            let added = self.presence.on_connected(&diff.added);
            self.system_log(LogLevel::Info, format!("Connected: {}", join_ids(&added)));
            changed = true;
        }
        if changed {
            self.emit_devices_changed();
        }
    }

    fn emit_devices_changed(&self) {
        let available = self.presence.available();
        self.applied_tx.send_replace(available.clone());
        self.emit(CoordinatorEvent::DevicesChanged { available });
    }

    // ─────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────

    fn begin_shutdown(&mut self) {
        info!("Coordinator shutting down");
        self.shutting_down = true;
        let drained = self.registry.drain();
        self.shutdown_sessions.extend(drained);
    }

    /// Terminate every session still owned, then announce shutdown.
    async fn finish_shutdown(&mut self) {
        if !self.shutting_down {
            self.begin_shutdown();
        }

        for state in std::mem::take(&mut self.shutdown_sessions) {
            self.emit(CoordinatorEvent::SessionStopped {
                device_id: state.device_id.clone(),
                reason: StopReason::Shutdown,
            });
            if let Err(e) = self.launcher.terminate_session(&state.handle).await {
                warn!("Failed to stop {} during shutdown: {}", state.device_id, e);
            }
        }

        self.emit(CoordinatorEvent::Shutdown);
    }
}

fn respond(reply: Option<Reply<()>>, result: Result<()>) {
    if let Some(reply) = reply {
        // The requester may have given up waiting
        let _ = reply.send(result);
    }
}

fn join_ids(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
