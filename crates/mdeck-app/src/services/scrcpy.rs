//! scrcpy-backed session launcher

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, ProcessEvent};
use mdeck_daemon::MirrorProcess;

use super::{ProcessHandle, SessionLauncher};
use crate::config::ScrcpySettings;
use crate::message::Message;

/// Capacity of the per-process event channel
const PROCESS_EVENT_CAPACITY: usize = 256;

type ProcessMap = Arc<Mutex<HashMap<u64, MirrorProcess>>>;

/// Launches one `scrcpy -s <serial>` process per session.
///
/// Owns the child processes; the coordinator only sees [`ProcessHandle`]s.
/// Output lines and exits are forwarded to the coordinator's message channel.
pub struct ScrcpyLauncher {
    binary: String,
    stop_timeout: Duration,
    msg_tx: mpsc::Sender<Message>,
    processes: ProcessMap,
    next_id: AtomicU64,
}

impl ScrcpyLauncher {
    pub fn new(
        binary: impl Into<String>,
        stop_timeout: Duration,
        msg_tx: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            binary: binary.into(),
            stop_timeout,
            msg_tx,
            processes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_settings(settings: &ScrcpySettings, msg_tx: mpsc::Sender<Message>) -> Self {
        Self::new(settings.path.clone(), settings.stop_timeout(), msg_tx)
    }

    /// Number of processes that have not reported an exit yet
    pub async fn live_processes(&self) -> usize {
        self.processes.lock().await.len()
    }

    /// Relay one process's events into the coordinator, tagged with its handle.
    fn spawn_forwarder(
        &self,
        device_id: DeviceId,
        handle_id: u64,
        mut rx: mpsc::Receiver<ProcessEvent>,
    ) {
        let msg_tx = self.msg_tx.clone();
        let processes = Arc::clone(&self.processes);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let exited = matches!(event, ProcessEvent::Exited { .. });
                let msg = Message::Process {
                    device_id: device_id.clone(),
                    handle_id,
                    event,
                };
                if msg_tx.send(msg).await.is_err() {
                    debug!("Coordinator gone, dropping events for {}", device_id);
                    break;
                }
                if exited {
                    processes.lock().await.remove(&handle_id);
                    break;
                }
            }
            trace!("forwarder for {} (handle {}) finished", device_id, handle_id);
        });
    }
}

impl SessionLauncher for ScrcpyLauncher {
    async fn launch_session(&self, device_id: &DeviceId, args: &[String]) -> Result<ProcessHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (event_tx, event_rx) = mpsc::channel(PROCESS_EVENT_CAPACITY);

        let full_args = MirrorProcess::build_args(device_id, args);
        let process = MirrorProcess::spawn(&self.binary, &full_args, event_tx)?;
        let handle = ProcessHandle::new(id, process.id());

        // Register before forwarding so an instant exit still finds its entry
        self.processes.lock().await.insert(id, process);
        self.spawn_forwarder(device_id.clone(), id, event_rx);

        info!("Launched mirroring for {} as handle {}", device_id, id);
        Ok(handle)
    }

    async fn terminate_session(&self, handle: &ProcessHandle) -> Result<()> {
        let process = self.processes.lock().await.remove(&handle.id);
        match process {
            Some(mut process) => process.shutdown(self.stop_timeout).await,
            None => {
                debug!("Handle {} already exited", handle.id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Stand-in for scrcpy; receives `-s <serial>` as `$1 $2`.
    fn write_fake_scrcpy(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-scrcpy");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    async fn next_process_event(rx: &mut mpsc::Receiver<Message>) -> (DeviceId, u64, ProcessEvent) {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for process event")
                .expect("channel closed");
            if let Message::Process {
                device_id,
                handle_id,
                event,
            } = msg
            {
                return (device_id, handle_id, event);
            }
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_launch_forwards_tagged_events() {
        let temp = tempfile::tempdir().unwrap();
        let binary = write_fake_scrcpy(temp.path(), "echo \"INFO: serial $2\"\nexit 0");
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let launcher = ScrcpyLauncher::new(binary, Duration::from_secs(2), msg_tx);

        let device = DeviceId::from("R58M123");
        let handle = launcher.launch_session(&device, &[]).await.unwrap();

        let (dev, id, event) = next_process_event(&mut msg_rx).await;
        assert_eq!(dev, device);
        assert_eq!(id, handle.id);
        assert_eq!(event, ProcessEvent::Stdout("INFO: serial R58M123".to_string()));

        let (_, _, event) = next_process_event(&mut msg_rx).await;
        assert_eq!(event, ProcessEvent::Exited { code: Some(0) });
    }

    #[tokio::test]
    #[serial]
    async fn test_terminate_running_session() {
        let temp = tempfile::tempdir().unwrap();
        let binary = write_fake_scrcpy(temp.path(), "sleep 60");
        let (msg_tx, mut msg_rx) = mpsc::channel(16);
        let launcher = ScrcpyLauncher::new(binary, Duration::from_secs(2), msg_tx);

        let handle = launcher
            .launch_session(&DeviceId::from("A"), &[])
            .await
            .unwrap();
        assert_eq!(launcher.live_processes().await, 1);

        launcher.terminate_session(&handle).await.unwrap();
        assert_eq!(launcher.live_processes().await, 0);

        let (_, _, event) = next_process_event(&mut msg_rx).await;
        assert!(matches!(event, ProcessEvent::Exited { .. }));
    }

    #[tokio::test]
    async fn test_terminate_unknown_handle_is_ok() {
        let (msg_tx, _msg_rx) = mpsc::channel(16);
        let launcher = ScrcpyLauncher::new("scrcpy", Duration::from_secs(1), msg_tx);
        assert!(launcher
            .terminate_session(&ProcessHandle::new(42, None))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let (msg_tx, _msg_rx) = mpsc::channel(16);
        let launcher = ScrcpyLauncher::new("/nonexistent/scrcpy", Duration::from_secs(1), msg_tx);
        let result = launcher.launch_session(&DeviceId::from("A"), &[]).await;
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }
}
