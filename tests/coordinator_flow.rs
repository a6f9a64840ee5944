//! End-to-end coordinator flows through the public handle, with fake collaborators

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use mdeck_app::test_utils::{FakeEnumerator, FakeLauncher, FakeNotificationSink};
use mdeck_app::{
    message, Coordinator, CoordinatorEvent, CoordinatorHandle, DeliveryOutcome, Settings,
    StopReason,
};
use mdeck_core::{DeviceId, Error, LogLevel, PresenceEvent, ProcessEvent};

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    handle: CoordinatorHandle,
    events: broadcast::Receiver<CoordinatorEvent>,
    enumerator: FakeEnumerator,
    launcher: FakeLauncher,
    sink: FakeNotificationSink,
    task: JoinHandle<()>,
}

fn spawn_coordinator() -> Running {
    let channel = message::channel();
    let enumerator = FakeEnumerator::new();
    let launcher = FakeLauncher::with_events(channel.0.clone());
    let sink = FakeNotificationSink::new();

    let coordinator = Coordinator::new(
        enumerator.clone(),
        launcher.clone(),
        sink.clone(),
        Settings::default(),
        channel,
    );
    let events = coordinator.subscribe();
    let handle = coordinator.handle();
    let task = tokio::spawn(coordinator.run());

    Running {
        handle,
        events,
        enumerator,
        launcher,
        sink,
        task,
    }
}

fn dev(id: &str) -> DeviceId {
    DeviceId::from(id)
}

impl Running {
    /// Wait for the first event matching `pred`, skipping others
    async fn wait_for(&mut self, pred: impl Fn(&CoordinatorEvent) -> bool) -> CoordinatorEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for coordinator event")
    }

    async fn connect(&mut self, ids: &[&str]) {
        let ids: Vec<DeviceId> = ids.iter().map(|s| dev(s)).collect();
        self.enumerator.set_devices(ids.clone());
        self.handle
            .presence(PresenceEvent::Connected(ids))
            .await
            .unwrap();
        self.wait_for(|e| matches!(e, CoordinatorEvent::DevicesChanged { .. }))
            .await;
    }

    async fn shutdown(mut self) -> FakeLauncher {
        self.handle.shutdown().await.unwrap();
        self.wait_for(|e| matches!(e, CoordinatorEvent::Shutdown)).await;
        self.task.await.unwrap();
        self.launcher
    }
}

#[tokio::test]
async fn test_install_flow_notifies_once() {
    let mut rt = spawn_coordinator();
    rt.connect(&["R58M123"]).await;
    rt.handle.start("R58M123", vec![]).await.unwrap();

    let id = dev("R58M123");
    for line in [
        "INFO: Request to install /tmp/app.apk",
        "adb: failed to install /tmp/app.apk: Failure [INSTALL_FAILED_VERSION_DOWNGRADE]",
        "ERROR: Failed to install /tmp/app.apk",
        "ERROR: Failed to install /tmp/app.apk",
    ] {
        assert!(rt.launcher.emit_line(&id, line).await);
    }

    let event = rt
        .wait_for(|e| matches!(e, CoordinatorEvent::NotificationDispatched { .. }))
        .await;
    if let CoordinatorEvent::NotificationDispatched { key, outcome } = event {
        assert_eq!(key.resource_path, "/tmp/app.apk");
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    // Both terminal lines are processed before this query is answered
    let logs = rt.handle.device_logs("R58M123").await.unwrap();
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[2].level, LogLevel::Error);

    assert_eq!(
        rt.sink.sent(),
        vec![(
            "Install failed".to_string(),
            "/tmp/app.apk on R58M123: Failure [INSTALL_FAILED_VERSION_DOWNGRADE]".to_string()
        )]
    );

    rt.shutdown().await;
}

#[tokio::test]
async fn test_start_stop_round_trip() {
    let mut rt = spawn_coordinator();
    rt.connect(&["A"]).await;

    rt.handle.start("A", vec!["--no-audio".to_string()]).await.unwrap();
    assert_eq!(rt.handle.snapshot().await.unwrap().running, vec![dev("A")]);

    let second = rt.handle.start("A", vec![]).await;
    assert!(matches!(second, Err(Error::AlreadyRunning { .. })));

    rt.handle.stop("A").await.unwrap();
    assert!(rt.handle.snapshot().await.unwrap().running.is_empty());
    // Stopping again is a no-op
    assert_ok!(rt.handle.stop("A").await);

    let launcher = rt.shutdown().await;
    assert_eq!(launcher.launched(), vec![(dev("A"), vec!["--no-audio".to_string()])]);
    assert_eq!(launcher.terminated().len(), 1);
}

#[tokio::test]
async fn test_start_on_absent_device_is_rejected() {
    let rt = spawn_coordinator();
    let err = assert_err!(rt.handle.start("ghost", vec![]).await);
    assert!(matches!(err, Error::DeviceNotAvailable { .. }));
    assert!(rt.launcher.launched().is_empty());
    rt.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_stops_session() {
    let mut rt = spawn_coordinator();
    rt.connect(&["A", "B"]).await;
    rt.handle.start("A", vec![]).await.unwrap();
    rt.handle.select("A").await.unwrap();

    rt.enumerator.set_devices(vec![dev("B")]);
    rt.handle
        .presence(PresenceEvent::Disconnected(vec![dev("A")]))
        .await
        .unwrap();

    let event = rt
        .wait_for(|e| matches!(e, CoordinatorEvent::SessionStopped { .. }))
        .await;
    assert!(matches!(
        event,
        CoordinatorEvent::SessionStopped {
            reason: StopReason::Disconnected,
            ..
        }
    ));

    let snapshot = rt.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.available, vec![dev("B")]);
    assert!(snapshot.running.is_empty());
    assert!(snapshot.selected.is_empty());

    rt.shutdown().await;
}

#[tokio::test]
async fn test_process_exit_allows_restart() {
    let mut rt = spawn_coordinator();
    rt.connect(&["A"]).await;
    rt.handle.start("A", vec![]).await.unwrap();

    assert!(
        rt.launcher
            .emit(&dev("A"), ProcessEvent::Exited { code: Some(0) })
            .await
    );
    rt.wait_for(|e| {
        matches!(
            e,
            CoordinatorEvent::SessionStopped {
                reason: StopReason::Exited { code: Some(0) },
                ..
            }
        )
    })
    .await;

    rt.handle.start("A", vec![]).await.unwrap();
    assert_eq!(rt.launcher.launched().len(), 2);

    rt.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_terminates_all_sessions() {
    let mut rt = spawn_coordinator();
    rt.connect(&["A", "B"]).await;
    rt.handle.start("A", vec![]).await.unwrap();
    rt.handle.start("B", vec![]).await.unwrap();

    let handle = rt.handle.clone();
    let launcher = rt.shutdown().await;

    assert_eq!(launcher.terminated().len(), 2);
    assert!(handle.is_closed());
}

#[tokio::test]
async fn test_refresh_failure_is_logged_not_applied() {
    let mut rt = spawn_coordinator();
    rt.connect(&["A"]).await;

    rt.enumerator.fail_with("adb server not running");
    rt.handle.refresh().await.unwrap();

    // Give the spawned enumeration a chance to report back
    let mut logged = false;
    for _ in 0..50 {
        let logs = rt.handle.system_logs().await.unwrap();
        if logs.iter().any(|e| e.message.contains("adb server not running")) {
            logged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(logged);
    assert_eq!(rt.handle.snapshot().await.unwrap().available, vec![dev("A")]);

    rt.shutdown().await;
}

#[tokio::test]
async fn test_monitor_restores_device_dropped_by_refresh() {
    let channel = message::channel();
    let enumerator = FakeEnumerator::new();
    // First poll sees A, the refresh it triggers briefly does not, later polls do
    enumerator.script(vec![vec![dev("A")], vec![]]);
    enumerator.set_devices(vec![dev("A")]);
    let launcher = FakeLauncher::with_events(channel.0.clone());

    let coordinator = Coordinator::new(
        enumerator.clone(),
        launcher.clone(),
        FakeNotificationSink::new(),
        Settings::default(),
        channel,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let _monitor = coordinator.spawn_presence_monitor(Duration::from_millis(100), shutdown_rx);

    let mut rt = Running {
        events: coordinator.subscribe(),
        handle: coordinator.handle(),
        enumerator,
        launcher,
        sink: FakeNotificationSink::new(),
        task: tokio::spawn(coordinator.run()),
    };

    rt.wait_for(|e| {
        matches!(e, CoordinatorEvent::DevicesChanged { available } if available.is_empty())
    })
    .await;
    rt.wait_for(|e| {
        matches!(e, CoordinatorEvent::DevicesChanged { available } if *available == [dev("A")])
    })
    .await;

    assert_ok!(rt.handle.start("A", vec![]).await);
    assert!(rt.enumerator.calls() >= 3);

    shutdown_tx.send(true).unwrap();
    rt.shutdown().await;
}
