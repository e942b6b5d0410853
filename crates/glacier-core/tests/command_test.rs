#![allow(clippy::unwrap_used)]

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{FakePush, Harness, config, device, link, snapshot};
use glacier_api::PushState;
use glacier_core::{
    Command, CommandResult, CoreError, DeviceKind, DeviceStatus, DeviceUpdate, EntityId,
    NewDevice, ScanPhase,
};

fn with_ip(id: &str, ip: &str) -> serde_json::Value {
    let mut d = device(id);
    d["ip"] = json!(ip);
    d
}

// ── Preconditions ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn missing_token_fails_locally() {
    let mut cfg = config();
    cfg.token = None;
    let h = Harness::new(cfg, snapshot(vec![device("a")], vec![]));
    h.start().await;

    let err = h
        .glacier
        .execute(Command::CreateDevice(NewDevice::new("nas", DeviceKind::Server)))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationMissing));
    assert!(h.inventory.calls().is_empty());
    assert_eq!(h.glacier.state().error, Some(err.to_string()));
}

#[tokio::test(start_paused = true)]
async fn blank_label_is_a_validation_error() {
    let h = Harness::new(config(), snapshot(vec![], vec![]));
    h.start().await;

    let err = h
        .glacier
        .execute(Command::CreateDevice(NewDevice::new("   ", DeviceKind::Other)))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(h.inventory.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rescan_without_ip_never_emits() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.start().await;

    let err = h
        .glacier
        .execute(Command::RescanDevice { id: "a".into() })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(h.push.emitted().is_empty());
    assert!(h.glacier.state().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn rescan_requires_connected_push() {
    let h = Harness::with_push(
        config(),
        snapshot(vec![with_ip("a", "10.0.0.5")], vec![]),
        FakePush::default(),
    );
    h.start().await;
    h.push.set_state(PushState::Reconnecting { attempt: 2 });

    let err = h
        .glacier
        .execute(Command::RescanDevice { id: "a".into() })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::PushChannelUnavailable));
    assert!(h.push.emitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_device_is_reported() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.start().await;

    let err = h
        .glacier
        .execute(Command::ToggleStatus { id: "ghost".into() })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DeviceNotFound { ref identifier } if identifier == "ghost"));
}

// ── Device operations ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rescan_emits_scoped_request_and_notice() {
    let h = Harness::new(config(), snapshot(vec![with_ip("a", "10.0.0.5")], vec![]));
    h.push.ack_with(
        "start_network_scan",
        json!({ "status": "success", "scan_id": "r1", "job_id": "j1" }),
    );
    h.start().await;

    let result = h
        .glacier
        .execute(Command::RescanDevice { id: "a".into() })
        .await
        .unwrap();

    assert_eq!(
        result,
        CommandResult::ScanStarted {
            scan_id: Some("r1".into()),
            job_id: Some("j1".into()),
        }
    );
    assert_eq!(
        h.push.emitted(),
        vec![(
            "start_network_scan".to_owned(),
            json!({ "ip_range": "10.0.0.5", "target_device_id": "a" })
        )]
    );
    let state = h.glacier.state();
    assert!(state.scan.is_scanning());
    assert_eq!(state.notice.as_deref(), Some("Rescanning dev-a (10.0.0.5)"));
}

#[tokio::test(start_paused = true)]
async fn toggle_flips_online_to_offline() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.start().await;

    let result = h
        .glacier
        .execute(Command::ToggleStatus { id: "a".into() })
        .await
        .unwrap();

    assert!(matches!(result, CommandResult::Device(ref d) if d.status == DeviceStatus::Offline));
    assert_eq!(h.inventory.calls(), vec!["status a offline"]);
    let state = h.glacier.state();
    assert_eq!(
        state.topology.device(&"a".into()).unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test(start_paused = true)]
async fn edit_upserts_the_canonical_device() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.start().await;

    let update = DeviceUpdate {
        label: Some("core-router".into()),
        ..DeviceUpdate::default()
    };
    h.glacier
        .execute(Command::UpdateDevice {
            id: "a".into(),
            update,
        })
        .await
        .unwrap();

    let state = h.glacier.state();
    assert_eq!(state.topology.device(&"a".into()).unwrap().label, "core-router");
    assert_eq!(state.topology.devices.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn remove_cascades_connections_and_selection() {
    let h = Harness::new(
        config(),
        snapshot(
            vec![device("a"), device("b"), device("c")],
            vec![link("a", "b"), link("c", "a"), link("b", "c")],
        ),
    );
    h.start().await;
    h.glacier.select(Some("a".into())).await.unwrap();
    assert_eq!(h.glacier.state().selection, Some(EntityId::from("a")));
    assert_eq!(
        h.glacier.state().selected_device().map(|d| d.label.as_str()),
        Some("dev-a")
    );

    h.glacier
        .execute(Command::RemoveDevice { id: "a".into() })
        .await
        .unwrap();

    let state = h.glacier.state();
    assert!(state.topology.device(&"a".into()).is_none());
    assert_eq!(state.topology.connections.len(), 1);
    assert_eq!(state.topology.connections[0].source, EntityId::from("b"));
    assert_eq!(state.selection, None);
    assert!(state.selected_device().is_none());
}

#[tokio::test(start_paused = true)]
async fn ignore_removes_locally_and_unignore_refetches() {
    let h = Harness::new(config(), snapshot(vec![device("a"), device("b")], vec![]));
    h.start().await;

    h.glacier
        .execute(Command::IgnoreDevice { id: "b".into() })
        .await
        .unwrap();
    assert!(h.glacier.state().topology.device(&"b".into()).is_none());

    h.glacier
        .execute(Command::UnignoreDevice { id: "b".into() })
        .await
        .unwrap();
    h.settle(|s| s.topology.device(&"b".into()).is_some()).await;

    assert_eq!(h.inventory.calls(), vec!["ignore b", "unignore b"]);
    assert_eq!(h.source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn create_pulls_snapshot_over_push() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.push.ack_with(
        "get_network_topology",
        snapshot(vec![device("a"), device("new-1")], vec![link("a", "new-1")]),
    );
    h.start().await;

    let result = h
        .glacier
        .execute(Command::CreateDevice(NewDevice::new("nas", DeviceKind::Server)))
        .await
        .unwrap();

    assert!(matches!(result, CommandResult::Device(ref d) if d.id.as_str() == "new-1"));
    let state = h.glacier.state();
    assert_eq!(state.topology.devices.len(), 2);
    assert_eq!(state.topology.connections.len(), 1);
    assert_eq!(h.push.emitted()[0].0, "get_network_topology");
}

#[tokio::test(start_paused = true)]
async fn create_without_push_appends_optimistically() {
    let h = Harness::with_push(
        config(),
        snapshot(vec![device("a")], vec![]),
        FakePush::default(),
    );
    h.start().await;
    h.push.set_state(PushState::Disconnected);

    h.glacier
        .execute(Command::CreateDevice(NewDevice::new("nas", DeviceKind::Server)))
        .await
        .unwrap();

    let state = h.glacier.state();
    let created = state.topology.device(&"new-1".into()).unwrap();
    assert_eq!(created.label, "nas");
    assert_eq!(created.kind, DeviceKind::Server);
}

#[tokio::test(start_paused = true)]
async fn create_falls_back_when_push_snapshot_fails() {
    let h = Harness::new(config(), snapshot(vec![device("a")], vec![]));
    h.push.ack_with(
        "get_network_topology",
        json!({ "status": "error", "message": "db locked" }),
    );
    h.start().await;

    h.glacier
        .execute(Command::CreateDevice(NewDevice::new("nas", DeviceKind::Server)))
        .await
        .unwrap();

    let state = h.glacier.state();
    assert!(state.topology.device(&"new-1".into()).is_some());
    assert!(state.error.is_none());
}

// ── Scan operations ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_scan_transitions_to_scanning() {
    let h = Harness::new(config(), snapshot(vec![], vec![]));
    h.push.ack_with(
        "start_network_scan",
        json!({ "status": "success", "message": "Scan started", "scan_id": "s9" }),
    );
    h.start().await;

    h.glacier
        .execute(Command::StartScan {
            ip_range: Some("10.0.0.0/24".into()),
        })
        .await
        .unwrap();

    let state = h.glacier.state();
    assert_eq!(state.scan.active().unwrap().scan_id.as_deref(), Some("s9"));
    assert_eq!(state.notice.as_deref(), Some("Scan started"));
    assert_eq!(
        h.push.emitted()[0].1,
        json!({ "ip_range": "10.0.0.0/24" })
    );
}

#[tokio::test(start_paused = true)]
async fn scan_can_start_after_snapshot_reports_none_running() {
    let mut running = snapshot(vec![], vec![]);
    running["activeScanInProgress"] = json!(true);
    running["lastScan"] = json!({ "id": "s1" });
    let h = Harness::new(config(), running);
    h.push.ack_with(
        "start_network_scan",
        json!({ "status": "success", "scan_id": "s2" }),
    );
    h.start().await;
    assert!(h.glacier.state().scan.is_scanning());

    let mut finished = snapshot(vec![], vec![]);
    finished["lastScan"] = json!({ "id": "s1" });
    h.push.deliver("network_topology_update", finished);
    h.settle(|s| !s.scan.is_scanning()).await;

    h.glacier
        .execute(Command::StartScan { ip_range: None })
        .await
        .unwrap();
    assert_eq!(
        h.glacier.state().scan.active().unwrap().scan_id.as_deref(),
        Some("s2")
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_scan_surfaces_and_stays_idle() {
    let h = Harness::new(config(), snapshot(vec![], vec![]));
    h.push.ack_with(
        "start_network_scan",
        json!({ "status": "error", "message": "A scan is already running" }),
    );
    h.start().await;

    let err = h
        .glacier
        .execute(Command::StartScan { ip_range: None })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Rejected { .. }));
    let state = h.glacier.state();
    assert_eq!(state.scan, ScanPhase::Idle { outcome: None });
    assert_eq!(
        state.error.as_deref(),
        Some("Rejected by server: A scan is already running")
    );
}

#[tokio::test(start_paused = true)]
async fn start_scan_without_push_is_rejected_locally() {
    let h = Harness::with_push(config(), snapshot(vec![], vec![]), FakePush::default());
    h.start().await;
    h.push.set_state(PushState::Disconnected);

    let err = h
        .glacier
        .execute(Command::StartScan { ip_range: None })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::PushChannelUnavailable));
    assert_eq!(h.glacier.state().scan, ScanPhase::Idle { outcome: None });
}

#[tokio::test(start_paused = true)]
async fn cancel_requires_a_tracked_scan() {
    let h = Harness::new(config(), snapshot(vec![], vec![]));
    h.start().await;

    let err = h.glacier.execute(Command::CancelScan).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    h.push
        .deliver("scan_progress", json!({ "progress": 30, "scan_id": "s1", "job_id": "j1" }));
    h.settle(|s| s.scan.is_scanning()).await;

    h.glacier.execute(Command::CancelScan).await.unwrap();

    let (event, data) = h.push.emitted().pop().unwrap();
    assert_eq!(event, "cancel_network_scan");
    assert_eq!(data, json!({ "scan_id": "s1", "job_id": "j1" }));
    assert!(!h.glacier.state().scan.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn check_scan_status_clears_stale_and_refetches() {
    let stale = json!({
        "devices": [],
        "connections": [],
        "lastScan": { "id": "s1", "isStale": true },
        "activeScanInProgress": true,
    });
    let h = Harness::new(config(), stale);
    h.push.ack_with(
        "check_scan_status",
        json!({ "status": "success", "message": "Cleaned up 1 stale scan", "cleaned_scans": 1 }),
    );
    h.start().await;
    assert_eq!(h.glacier.state().scan, ScanPhase::StaleDetected);

    h.source.set_fallback(snapshot(vec![device("a")], vec![]));
    let result = h.glacier.execute(Command::CheckScanStatus).await.unwrap();

    assert_eq!(
        result,
        CommandResult::Message("Cleaned up 1 stale scan".into())
    );
    let state = h.settle(|s| !s.topology.is_empty()).await;
    assert_eq!(state.scan, ScanPhase::Idle { outcome: None });
}

#[tokio::test(start_paused = true)]
async fn commands_after_deactivate_are_inactive() {
    let h = Harness::new(config(), snapshot(vec![], vec![]));
    h.start().await;
    h.glacier.deactivate().await;

    let err = h
        .glacier
        .execute(Command::CheckScanStatus)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Inactive));
}
