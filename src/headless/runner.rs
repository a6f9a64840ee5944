//! Headless mode runner - coordinator event loop printing NDJSON

use std::collections::BTreeSet;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use mdeck_app::services::{AdbDeviceEnumerator, HostNotificationSink, ScrcpyLauncher};
use mdeck_app::{
    message, Coordinator, CoordinatorEvent, CoordinatorHandle, Settings, ToolAvailability,
};
use mdeck_core::prelude::*;
use mdeck_core::DeviceId;
use mdeck_daemon::discover_devices_with_timeout;

use super::HeadlessEvent;

/// What a headless run should do besides reporting events
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Deliver notifications through the desktop sink regardless of config
    pub notify: bool,
    /// Serials to start a mirroring session for as soon as they appear
    pub mirror: Vec<DeviceId>,
    /// Extra scrcpy args for sessions started by this run
    pub mirror_args: Vec<String>,
}

/// Enumerate once and print one `device` event per serial
pub async fn run_devices(settings: &Settings) -> Result<()> {
    let tools = ToolAvailability::check(&settings.adb.path, &settings.scrcpy.path);
    if let Some(message) = tools.adb_unavailable_message() {
        HeadlessEvent::error(message, true).emit();
        return Err(Error::tool_not_found(&settings.adb.path));
    }

    let result =
        discover_devices_with_timeout(&settings.adb.path, settings.adb.enumerate_timeout()).await?;
    info!(
        "Found {} device(s) in {:?}",
        result.devices.len(),
        result.elapsed
    );
    for device in &result.devices {
        HeadlessEvent::device(device.as_str()).emit();
    }
    Ok(())
}

/// Run the coordinator until Ctrl-C, printing every event
pub async fn run_headless(mut settings: Settings, options: WatchOptions) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("Mirror Deck starting in HEADLESS mode");
    if !options.mirror.is_empty() {
        info!("Mirroring: {:?}", options.mirror);
    }
    info!("═══════════════════════════════════════════════════════");

    let tools = ToolAvailability::check(&settings.adb.path, &settings.scrcpy.path);
    if let Some(message) = tools.adb_unavailable_message() {
        HeadlessEvent::error(message, true).emit();
        return Err(Error::tool_not_found(&settings.adb.path));
    }
    if let Some(message) = tools.scrcpy_unavailable_message() {
        // Watching still works; only starts will fail
        let fatal = !options.mirror.is_empty();
        HeadlessEvent::error(message, fatal).emit();
        if fatal {
            return Err(Error::tool_not_found(&settings.scrcpy.path));
        }
    }

    if options.notify {
        settings.notifications.enabled = true;
        settings.notifications.desktop = true;
    }

    let channel = message::channel();
    let enumerator = AdbDeviceEnumerator::from_settings(&settings.adb);
    let launcher = ScrcpyLauncher::from_settings(&settings.scrcpy, channel.0.clone());
    let sink = HostNotificationSink::select(settings.notifications.desktop);
    let poll_interval = settings.adb.poll_interval();

    let coordinator = Coordinator::new(enumerator, launcher, sink, settings, channel);
    let mut events = coordinator.subscribe();
    let handle = coordinator.handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _monitor = coordinator.spawn_presence_monitor(poll_interval, shutdown_rx);
    let coordinator_task = tokio::spawn(coordinator.run());

    spawn_signal_handler(handle.clone());
    handle.refresh().await?;

    let result = headless_event_loop(&mut events, &handle, &options).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = coordinator_task.await {
        error!("Coordinator task failed: {}", e);
    }

    info!("Mirror Deck headless mode exiting");
    result
}

/// Print events until the coordinator announces shutdown
async fn headless_event_loop(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    handle: &CoordinatorHandle,
    options: &WatchOptions,
) -> Result<()> {
    let wanted: BTreeSet<DeviceId> = options.mirror.iter().cloned().collect();
    let mut requested: BTreeSet<DeviceId> = BTreeSet::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Headless output lagged, {} event(s) skipped", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Event channel closed");
                break;
            }
        };

        HeadlessEvent::from(&event).emit();

        match event {
            CoordinatorEvent::DevicesChanged { available } => {
                // Forget devices that left so they restart on reconnect
                requested.retain(|id| available.contains(id));
                for device_id in available.into_iter().filter(|id| wanted.contains(id)) {
                    if requested.insert(device_id.clone()) {
                        spawn_start(handle.clone(), device_id, options.mirror_args.clone());
                    }
                }
            }
            CoordinatorEvent::Shutdown => break,
            _ => {}
        }
    }

    Ok(())
}

/// Start a session without blocking the event loop on the launch
fn spawn_start(handle: CoordinatorHandle, device_id: DeviceId, args: Vec<String>) {
    tokio::spawn(async move {
        info!("Auto-starting session for {}", device_id);
        // Failures are already reported as start_failed events
        if let Err(e) = handle.start(device_id.clone(), args).await {
            debug!("Auto-start for {} failed: {}", device_id, e);
        }
    });
}

/// Request a coordinator shutdown on Ctrl-C
fn spawn_signal_handler(handle: CoordinatorHandle) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received Ctrl-C, shutting down");
        if let Err(e) = handle.shutdown().await {
            warn!("Shutdown request failed: {}", e);
        }
    });
}
