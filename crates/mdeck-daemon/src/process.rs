//! Mirroring (scrcpy) process management

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};

use mdeck_core::prelude::*;
use mdeck_core::{DeviceId, ProcessEvent};

/// Default time to wait for the process to go away after a kill request
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Manages one mirroring child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task
/// that calls `child.wait()`, so the real exit code is always captured and
/// emitted as `ProcessEvent::Exited`.
///
/// `MirrorProcess` keeps a kill channel to request termination, an atomic flag
/// for synchronous `has_exited()` checks, and a [`Notify`] so `shutdown()`
/// can await the exit without polling.
pub struct MirrorProcess {
    /// Process ID for logging
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl std::fmt::Debug for MirrorProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl MirrorProcess {
    /// Build the argument list for mirroring `device_id`.
    ///
    /// The serial always comes first so user-supplied arguments cannot
    /// retarget the session at another device.
    pub fn build_args(device_id: &DeviceId, extra_args: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(extra_args.len() + 2);
        args.push("-s".to_string());
        args.push(device_id.to_string());
        args.extend(
            extra_args
                .iter()
                .filter(|a| !a.trim().is_empty())
                .cloned(),
        );
        args
    }

    /// Spawn the mirroring binary with pre-built arguments.
    ///
    /// Output lines and the final exit are sent to `event_tx`.
    pub fn spawn(
        binary: &str,
        args: &[String],
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        info!("Spawning mirror process: {} {}", binary, args.join(" "));

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(binary)
                } else {
                    Error::launch_failure(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Mirror process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::launch_failure("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::launch_failure("stderr was not captured"))?;

        Ok(Self::attach(child, pid, stdout, stderr, event_tx))
    }

    /// Wire the reader and wait tasks around an already spawned child.
    fn attach(
        child: Child,
        pid: Option<u32>,
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Self {
        let (lines_done_tx, lines_done_rx) = oneshot::channel::<()>();
        tokio::spawn(Self::output_reader(stdout, stderr, event_tx.clone(), lines_done_tx));

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            lines_done_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        }
    }

    /// Background task: owns `child`, waits for it to exit, emits `Exited`.
    ///
    /// `Exited` is sent only after the output reader has drained both pipes,
    /// so per-device line order always ends with the exit signal.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        lines_done_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Mirror process exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for mirror process: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, killing mirror process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill mirror process: {}", e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Mirror process killed, exit status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Mark exited before sending the event so `has_exited()` is true
        // by the time callers observe it.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        // Pipes close when the child dies; a grandchild holding them open
        // must not delay the exit signal forever.
        if tokio::time::timeout(Duration::from_secs(1), lines_done_rx)
            .await
            .is_err()
        {
            debug!("Output reader still running after exit, sending Exited anyway");
        }

        debug!("Sending ProcessEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    /// Read stdout and stderr lines, forwarding them in arrival order.
    ///
    /// Lines are read as raw bytes and decoded lossily, so a non-UTF-8 byte
    /// never ends the stream. Only EOF or a read error closes a pipe.
    async fn output_reader(
        stdout: tokio::process::ChildStdout,
        stderr: tokio::process::ChildStderr,
        tx: mpsc::Sender<ProcessEvent>,
        done: oneshot::Sender<()>,
    ) {
        let mut out = BufReader::new(stdout);
        let mut err = BufReader::new(stderr);
        // Partial reads stay in these buffers if the other branch wins the select
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            let event = tokio::select! {
                read = out.read_until(b'\n', &mut out_buf), if out_open => {
                    match take_line(read, &mut out_buf, "stdout") {
                        Some(line) => Some(ProcessEvent::Stdout(line)),
                        None => {
                            out_open = false;
                            None
                        }
                    }
                }
                read = err.read_until(b'\n', &mut err_buf), if err_open => {
                    match take_line(read, &mut err_buf, "stderr") {
                        Some(line) => Some(ProcessEvent::Stderr(line)),
                        None => {
                            err_open = false;
                            None
                        }
                    }
                }
            };

            if let Some(event) = event {
                trace!("{:?}", event);
                if tx.send(event).await.is_err() {
                    debug!("process event channel closed");
                    break;
                }
            }
        }

        debug!("output reader finished");
        let _ = done.send(());
    }

    /// Terminate the process and wait for it to go away.
    ///
    /// Returns `TerminationFailure` if the process is still alive after
    /// `stop_timeout`.
    pub async fn shutdown(&mut self, stop_timeout: Duration) -> Result<()> {
        if self.has_exited() {
            info!("Mirror process already exited, nothing to stop");
            return Ok(());
        }

        // Create the `notified()` future before the final check so a
        // notification between the check and the await is not missed.
        let exit_notify = Arc::clone(&self.exit_notify);
        let notified = exit_notify.notified();
        self.request_kill();
        if self.has_exited() {
            return Ok(());
        }

        match tokio::time::timeout(stop_timeout, notified).await {
            Ok(()) => {
                info!("Mirror process {:?} stopped", self.pid);
                Ok(())
            }
            Err(_) => {
                warn!("Mirror process {:?} did not exit within {:?}", self.pid, stop_timeout);
                Err(Error::termination_failure(format!(
                    "process {:?} still running after {:?}",
                    self.pid, stop_timeout
                )))
            }
        }
    }

    /// Signal the wait task to kill the child. Idempotent.
    fn request_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }

    /// Check if the process has already exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for MirrorProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("MirrorProcess dropped while process may still be running");
            self.request_kill();
        }
        debug!("MirrorProcess dropped");
    }
}

/// Decode one completed `read_until` into a line, or `None` once the pipe is closed.
fn take_line(read: std::io::Result<usize>, buf: &mut Vec<u8>, stream: &str) -> Option<String> {
    match read {
        Ok(0) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            buf.clear();
            Some(line)
        }
        Err(e) => {
            warn!("Error reading mirror process {}: {}", stream, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_sh(script: &str, tx: mpsc::Sender<ProcessEvent>) -> MirrorProcess {
        MirrorProcess::spawn("sh", &["-c".to_string(), script.to_string()], tx)
            .expect("sh must be available in test environment")
    }

    async fn collect_until_exit(rx: &mut mpsc::Receiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(event)) => {
                    let done = matches!(event, ProcessEvent::Exited { .. });
                    events.push(event);
                    if done {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        events
    }

    #[test]
    fn test_build_args_puts_serial_first() {
        let args = MirrorProcess::build_args(
            &DeviceId::from("R58M123"),
            &["--max-size".to_string(), "1024".to_string(), " ".to_string()],
        );
        assert_eq!(args, vec!["-s", "R58M123", "--max-size", "1024"]);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let (tx, _rx) = mpsc::channel(16);
        let result = MirrorProcess::spawn("/nonexistent/scrcpy", &[], tx);
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn test_lines_then_exit_code() {
        let (tx, mut rx) = mpsc::channel(16);
        let _process = spawn_sh("echo 'INFO: Request to install /a.apk'; exit 3", tx).await;

        let events = collect_until_exit(&mut rx).await;
        assert_eq!(
            events.first(),
            Some(&ProcessEvent::Stdout(
                "INFO: Request to install /a.apk".to_string()
            ))
        );
        assert_eq!(events.last(), Some(&ProcessEvent::Exited { code: Some(3) }));
    }

    #[tokio::test]
    async fn test_stderr_lines_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(16);
        let _process = spawn_sh("echo 'ERROR: Failed to install /a.apk' >&2", tx).await;

        let events = collect_until_exit(&mut rx).await;
        assert!(events.contains(&ProcessEvent::Stderr(
            "ERROR: Failed to install /a.apk".to_string()
        )));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_close_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        let _process = spawn_sh(
            "printf 'INFO: Request to install /caf\\351.apk\\n'; echo 'INFO: /b.apk successfully installed'",
            tx,
        )
        .await;

        let events = collect_until_exit(&mut rx).await;
        assert_eq!(
            events,
            vec![
                ProcessEvent::Stdout("INFO: Request to install /caf\u{FFFD}.apk".to_string()),
                ProcessEvent::Stdout("INFO: /b.apk successfully installed".to_string()),
                ProcessEvent::Exited { code: Some(0) },
            ]
        );
    }

    #[test]
    fn test_take_line_strips_crlf_and_clears_buffer() {
        let mut buf = b"ERROR: Failed to push /x\r\n".to_vec();
        let len = buf.len();
        assert_eq!(
            take_line(Ok(len), &mut buf, "stderr"),
            Some("ERROR: Failed to push /x".to_string())
        );
        assert!(buf.is_empty());
        assert_eq!(take_line(Ok(0), &mut buf, "stderr"), None);
    }

    #[tokio::test]
    async fn test_exactly_one_exit_event() {
        let (tx, mut rx) = mpsc::channel(32);
        let _process = spawn_sh("exit 0", tx).await;

        let events = collect_until_exit(&mut rx).await;
        let exits = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Exited { .. }))
            .count();
        assert_eq!(exits, 1);
    }

    #[tokio::test]
    async fn test_shutdown_kills_long_running_process() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut process = spawn_sh("sleep 60", tx).await;
        assert!(process.is_running());

        process
            .shutdown(DEFAULT_STOP_TIMEOUT)
            .await
            .expect("shutdown should not error");
        assert!(process.has_exited());

        let events = collect_until_exit(&mut rx).await;
        assert!(matches!(events.last(), Some(ProcessEvent::Exited { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_after_exit_is_noop() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut process = spawn_sh("exit 0", tx).await;
        collect_until_exit(&mut rx).await;

        assert!(process.shutdown(DEFAULT_STOP_TIMEOUT).await.is_ok());
    }
}
