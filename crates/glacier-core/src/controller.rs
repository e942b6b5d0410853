// ── Topology module handle ──
//
// Lifecycle for one topology view: activation spawns the sync task, the
// command processor and the push forwarder; deactivation cancels and joins
// them. Consumers observe `GlacierState` through the store and mutate the
// inventory only through `execute`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use glacier_api::models::events;
use glacier_api::transport::{TlsMode, TransportConfig};
use glacier_api::{
    CreateDeviceRequest, InventoryClient, PushChannel, PushState, ReconnectConfig, ScanAck,
    StartScanRequest, TopologyPayload, UpdateDeviceRequest,
};

use crate::backend::{Backends, PushTransport};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::{GlacierConfig, TlsVerification};
use crate::error::CoreError;
use crate::layout::LayoutEngine;
use crate::model::{Device, DeviceStatus, EntityId, Topology};
use crate::store::{GlacierState, TopologyEvent, TopologyStore};
use crate::stream::StateStream;
use crate::sync::{ScanInput, Sequencer, SyncActor, SyncMessage, forward_push};

const COMMAND_CHANNEL_SIZE: usize = 64;
const SYNC_CHANNEL_SIZE: usize = 256;

// ── Glacier ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<GlacierInner>`. Nothing touches the network
/// until [`activate()`](Self::activate).
#[derive(Clone)]
pub struct Glacier {
    inner: Arc<GlacierInner>,
}

struct GlacierInner {
    config: GlacierConfig,
    store: Arc<TopologyStore>,
    backends: Backends,
    layout: LayoutEngine,
    sequencer: Arc<Sequencer>,
    /// Push channel in use: injected via `Backends`, or created on
    /// activation when push is enabled.
    push: Mutex<Option<Arc<dyn PushTransport>>>,
    active: AtomicBool,
    cancel: Mutex<CancellationToken>,
    sync_tx: Mutex<Option<mpsc::Sender<SyncMessage>>>,
    command_tx: Mutex<Option<mpsc::Sender<CommandEnvelope>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Glacier {
    /// Build a handle talking to the REST inventory described by `config`.
    /// The push channel is created on activation.
    pub fn new(config: GlacierConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = InventoryClient::new(config.url.clone(), config.token.clone(), &transport)?;
        Ok(Self::with_backends(config, Backends::from_client(client, None)))
    }

    /// Build a handle around explicit backends. An injected push transport
    /// is used as is; the configured push endpoint is then ignored.
    pub fn with_backends(config: GlacierConfig, backends: Backends) -> Self {
        let layout = LayoutEngine::layered(config.layout.clone());
        let push = backends.push.clone();

        Self {
            inner: Arc::new(GlacierInner {
                config,
                store: Arc::new(TopologyStore::new()),
                backends,
                layout,
                sequencer: Arc::new(Sequencer::default()),
                push: Mutex::new(push),
                active: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                sync_tx: Mutex::new(None),
                command_tx: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Swap the layout strategy. Only valid before activation.
    #[must_use]
    pub fn with_layout(self, layout: LayoutEngine) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.layout = layout;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("layout engine can only be replaced on an unshared handle");
                Self { inner }
            }
        }
    }

    pub fn config(&self) -> &GlacierConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.inner.store
    }

    /// Current module state.
    pub fn state(&self) -> Arc<GlacierState> {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> StateStream {
        self.inner.store.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start synchronizing: connect push (when enabled), spawn background
    /// tasks, and issue the initial snapshot fetch. Idempotent.
    pub async fn activate(&self) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;
        if self.is_active() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();

        let push = self.ensure_push(&cancel).await?;

        let (sync_tx, sync_rx) = mpsc::channel(SYNC_CHANNEL_SIZE);
        let actor = SyncActor::new(
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.backends.source),
            sync_tx.clone(),
            Arc::clone(&self.inner.sequencer),
            self.inner.layout.clone(),
            self.inner.config.relayout_debounce,
        );
        actor.spawn_fetch();
        handles.push(tokio::spawn(actor.run(sync_rx, cancel.clone())));

        if let Some(push) = push {
            handles.push(tokio::spawn(forward_push(
                push,
                sync_tx.clone(),
                Arc::clone(&self.inner.sequencer),
                cancel.clone(),
            )));
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        handles.push(tokio::spawn(command_processor_task(
            self.clone(),
            command_rx,
            cancel.clone(),
        )));

        *self.inner.sync_tx.lock().await = Some(sync_tx);
        *self.inner.command_tx.lock().await = Some(command_tx);
        self.inner.active.store(true, Ordering::SeqCst);

        info!(url = %self.inner.config.url, "topology module activated");
        Ok(())
    }

    /// Stop all background work. Pending fetch results are discarded and
    /// the relayout timer is dropped with the sync task.
    pub async fn deactivate(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.cancel.lock().await.cancel();
        *self.inner.command_tx.lock().await = None;
        *self.inner.sync_tx.lock().await = None;

        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        {
            let mut push = self.inner.push.lock().await;
            if let Some(ref channel) = *push {
                channel.shutdown();
            }
            // A channel created on activation is rebuilt on the next one.
            if self.inner.backends.push.is_none() {
                *push = None;
            }
        }

        let mut state = (*self.inner.store.snapshot()).clone();
        state.push = PushState::Disconnected;
        self.inner.store.replace(state);

        debug!("topology module deactivated");
    }

    async fn ensure_push(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn PushTransport>>, CoreError> {
        let mut slot = self.inner.push.lock().await;
        if slot.is_none() && self.inner.config.push.enabled {
            let settings = &self.inner.config.push;
            let url = self.inner.config.push_url()?;
            let reconnect = ReconnectConfig {
                initial_delay: settings.reconnect_initial_delay,
                max_delay: settings.reconnect_max_delay,
                max_retries: settings.max_retries,
                ack_timeout: settings.ack_timeout,
            };
            info!(url = %url, "connecting push channel");
            let channel = PushChannel::connect(
                url,
                self.inner.config.token.clone(),
                reconnect,
                cancel.child_token(),
            )?;
            *slot = Some(Arc::new(channel));
        }
        Ok(slot.clone())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Execute a command. Resolves once the command's authoritative result
    /// is in the store; failures are also written to the error slot.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let command_tx = self
            .inner
            .command_tx
            .lock()
            .await
            .clone()
            .ok_or(CoreError::Inactive)?;

        let (tx, rx) = oneshot::channel();
        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Inactive)?;

        rx.await.map_err(|_| CoreError::Inactive)?
    }

    // ── Presentation inputs ──────────────────────────────────────────

    /// Select a device, or clear the selection. Unknown ids clear it.
    pub async fn select(&self, id: Option<EntityId>) -> Result<(), CoreError> {
        let seq = self.inner.sequencer.next();
        self.post(SyncMessage::Apply {
            seq,
            events: vec![TopologyEvent::Selected(id)],
        })
        .await?;
        self.flush().await
    }

    /// Request a fresh snapshot. The result lands in the store
    /// asynchronously.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.post(SyncMessage::Refetch).await
    }

    /// Clear the error and notice slots.
    pub async fn dismiss(&self) -> Result<(), CoreError> {
        self.post(SyncMessage::Dismiss).await?;
        self.flush().await
    }

    // ── Internal helpers ─────────────────────────────────────────────

    async fn post(&self, msg: SyncMessage) -> Result<(), CoreError> {
        let tx = self
            .inner
            .sync_tx
            .lock()
            .await
            .clone()
            .ok_or(CoreError::Inactive)?;
        tx.send(msg).await.map_err(|_| CoreError::Inactive)
    }

    /// Wait until every message posted so far has been applied.
    async fn flush(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.post(SyncMessage::Flush(tx)).await?;
        rx.await.map_err(|_| CoreError::Inactive)
    }

    async fn apply(&self, events: Vec<TopologyEvent>) -> Result<(), CoreError> {
        let seq = self.inner.sequencer.next();
        self.post(SyncMessage::Apply { seq, events }).await
    }

    async fn connected_push(&self) -> Result<Arc<dyn PushTransport>, CoreError> {
        self.inner
            .push
            .lock()
            .await
            .clone()
            .filter(|push| push.is_connected())
            .ok_or(CoreError::PushChannelUnavailable)
    }

    /// Emit a scan request and decode its acknowledgement. A non-success
    /// status is a rejection.
    async fn emit_scan(&self, event: &str, data: Value) -> Result<ScanAck, CoreError> {
        let push = self.connected_push().await?;
        let raw = push.emit(event, data).await?;
        let ack: ScanAck = serde_json::from_value(raw)
            .map_err(|e| CoreError::Internal(format!("invalid {event} acknowledgement: {e}")))?;

        if ack.is_success() {
            Ok(ack)
        } else {
            Err(CoreError::Rejected {
                message: ack
                    .message
                    .unwrap_or_else(|| format!("{event} was rejected")),
            })
        }
    }

    /// Pull a full snapshot over the push channel. Returns whether one
    /// was applied.
    async fn pull_snapshot_via_push(&self) -> bool {
        let Ok(push) = self.connected_push().await else {
            return false;
        };
        let seq = self.inner.sequencer.next();

        let topology = match push.emit(events::GET_NETWORK_TOPOLOGY, json!({})).await {
            Ok(raw) => decode_topology_ack(raw),
            Err(e) => Err(CoreError::from(e)),
        };
        match topology {
            Ok(topology) => self
                .post(SyncMessage::Snapshot {
                    seq,
                    result: Ok(topology),
                })
                .await
                .is_ok(),
            Err(e) => {
                debug!(error = %e, "push snapshot unavailable, applying result locally");
                false
            }
        }
    }

    fn device(&self, id: &EntityId) -> Result<Device, CoreError> {
        self.state()
            .topology
            .device(id)
            .cloned()
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }
}

/// Process commands one at a time. Each result is applied (and any error
/// surfaced) before the caller is answered.
async fn command_processor_task(
    glacier: Glacier,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&glacier, envelope.command).await;
                if let Err(ref e) = result {
                    warn!(error = %e, "command failed");
                    let _ = glacier.post(SyncMessage::Failure(e.to_string())).await;
                }
                let _ = glacier.flush().await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
async fn route_command(glacier: &Glacier, cmd: Command) -> Result<CommandResult, CoreError> {
    let inventory = &glacier.inner.backends.inventory;

    if cmd.is_device_mutation() && glacier.inner.config.token.is_none() {
        return Err(CoreError::AuthenticationMissing);
    }

    match cmd {
        // ── Device operations ────────────────────────────────────────
        Command::CreateDevice(new) => {
            new.validate()?;
            let record = inventory
                .create_device(&CreateDeviceRequest::from(&new))
                .await?;
            let device = Device::from(record);
            info!(id = %device.id, label = %device.label, "device created");

            if !glacier.pull_snapshot_via_push().await {
                if device.id.is_empty() {
                    glacier.post(SyncMessage::Refetch).await?;
                } else {
                    glacier
                        .apply(vec![TopologyEvent::DeviceUpserted(device.clone())])
                        .await?;
                }
            }
            Ok(CommandResult::Device(device))
        }

        Command::UpdateDevice { id, update } => {
            update.validate()?;
            let record = inventory
                .update_device(id.as_str(), &UpdateDeviceRequest::from(&update))
                .await?;
            let device = canonical(record, &id);
            glacier
                .apply(vec![TopologyEvent::DeviceUpserted(device.clone())])
                .await?;
            Ok(CommandResult::Device(device))
        }

        Command::ToggleStatus { id } => {
            let next = glacier.device(&id)?.status.toggled();
            set_status(glacier, &id, next).await
        }

        Command::SetStatus { id, status } => set_status(glacier, &id, status).await,

        Command::RemoveDevice { id } => {
            match inventory.delete_device(id.as_str()).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(%id, "device already gone on the server");
                }
                Err(e) => return Err(e.into()),
            }
            glacier
                .apply(vec![TopologyEvent::DeviceRemoved(id)])
                .await?;
            Ok(CommandResult::Ok)
        }

        Command::IgnoreDevice { id } => {
            inventory.ignore_device(id.as_str()).await?;
            glacier
                .apply(vec![TopologyEvent::DeviceRemoved(id)])
                .await?;
            Ok(CommandResult::Ok)
        }

        Command::UnignoreDevice { id } => {
            inventory.unignore_device(id.as_str()).await?;
            debug!(%id, "device unignored, refreshing topology");
            glacier.post(SyncMessage::Refetch).await?;
            Ok(CommandResult::Ok)
        }

        Command::RescanDevice { id } => {
            let device = glacier.device(&id)?;
            let ip = device.ip.ok_or_else(|| {
                CoreError::validation(format!(
                    "Device \"{}\" has no IP address to rescan",
                    device.label
                ))
            })?;

            let request = StartScanRequest {
                ip_range: Some(ip.to_string()),
                target_device_id: Some(id.to_string()),
            };
            let ack = glacier
                .emit_scan(events::START_NETWORK_SCAN, to_value(&request)?)
                .await?;
            info!(%id, %ip, "device rescan requested");

            glacier
                .post(SyncMessage::Scan(ScanInput::Started {
                    scan_id: ack.scan_id().map(str::to_owned),
                    job_id: ack.job_id.clone(),
                    message: Some(format!("Rescanning {} ({ip})", device.label)),
                }))
                .await?;
            Ok(CommandResult::ScanStarted {
                scan_id: ack.scan_id().map(str::to_owned),
                job_id: ack.job_id,
            })
        }

        // ── Scan operations ──────────────────────────────────────────
        Command::StartScan { ip_range } => {
            if glacier.state().scan.is_scanning() {
                return Err(CoreError::validation("A scan is already in progress"));
            }
            let request = StartScanRequest {
                ip_range,
                target_device_id: None,
            };
            let ack = glacier
                .emit_scan(events::START_NETWORK_SCAN, to_value(&request)?)
                .await?;
            let scan_id = ack.scan_id().map(str::to_owned);
            info!(scan_id = ?scan_id, "network scan started");

            glacier
                .post(SyncMessage::Scan(ScanInput::Started {
                    scan_id: scan_id.clone(),
                    job_id: ack.job_id.clone(),
                    message: ack.message,
                }))
                .await?;
            Ok(CommandResult::ScanStarted {
                scan_id,
                job_id: ack.job_id,
            })
        }

        Command::CancelScan => {
            let state = glacier.state();
            let active = state
                .scan
                .active()
                .ok_or_else(|| CoreError::validation("No scan in progress"))?;

            let ack = glacier
                .emit_scan(
                    events::CANCEL_NETWORK_SCAN,
                    json!({ "scan_id": active.scan_id, "job_id": active.job_id }),
                )
                .await?;
            glacier
                .post(SyncMessage::Scan(ScanInput::Cancelled {
                    message: ack.message.clone(),
                }))
                .await?;
            Ok(ack.message.map_or(CommandResult::Ok, CommandResult::Message))
        }

        Command::CheckScanStatus => {
            let ack = glacier
                .emit_scan(events::CHECK_SCAN_STATUS, json!({}))
                .await?;
            if let Some(cleaned) = ack.cleaned_scans {
                debug!(cleaned, "stale scans cleaned up");
            }
            glacier
                .post(SyncMessage::Scan(ScanInput::StaleCleared {
                    message: ack.message.clone(),
                }))
                .await?;
            Ok(ack.message.map_or(CommandResult::Ok, CommandResult::Message))
        }
    }
}

async fn set_status(
    glacier: &Glacier,
    id: &EntityId,
    status: DeviceStatus,
) -> Result<CommandResult, CoreError> {
    let record = glacier
        .inner
        .backends
        .inventory
        .set_device_status(id.as_str(), status.as_ref())
        .await?;
    let device = canonical(record, id);
    glacier
        .apply(vec![TopologyEvent::DeviceUpserted(device.clone())])
        .await?;
    Ok(CommandResult::Device(device))
}

/// The server's device record, keyed by the requested id when the
/// response omits it.
fn canonical(record: glacier_api::DeviceRecord, id: &EntityId) -> Device {
    let mut device = Device::from(record);
    if device.id.is_empty() {
        device.id = id.clone();
    }
    device
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(e.to_string()))
}

/// `get_network_topology` acks carry either a snapshot or an error.
fn decode_topology_ack(raw: Value) -> Result<Topology, CoreError> {
    let failed = raw
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.eq_ignore_ascii_case("error"));
    if failed || raw.get("error").is_some() {
        let message = raw
            .get("message")
            .or_else(|| raw.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("topology request failed")
            .to_owned();
        return Err(CoreError::Rejected { message });
    }

    let payload: TopologyPayload = serde_json::from_value(raw)
        .map_err(|e| CoreError::Internal(format!("invalid topology acknowledgement: {e}")))?;
    Ok(Topology::from(payload))
}

/// Build a [`TransportConfig`] from the module configuration.
fn build_transport(config: &GlacierConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn topology_ack_error_is_rejected() {
        let err = decode_topology_ack(json!({ "status": "error", "message": "db locked" }))
            .unwrap_err();
        assert!(matches!(err, CoreError::Rejected { ref message } if message == "db locked"));

        let err = decode_topology_ack(json!({ "error": "boom" })).unwrap_err();
        assert!(matches!(err, CoreError::Rejected { ref message } if message == "boom"));
    }

    #[test]
    fn topology_ack_snapshot_decodes() {
        let topology = decode_topology_ack(json!({
            "devices": [{ "id": "d1", "label": "core", "type": "router" }],
            "connections": []
        }))
        .unwrap();
        assert_eq!(topology.devices.len(), 1);
    }

    #[test]
    fn tls_modes_map_to_transport() {
        assert!(matches!(
            tls_to_transport(&TlsVerification::DangerAcceptInvalid),
            TlsMode::DangerAcceptInvalid
        ));
        assert!(matches!(
            tls_to_transport(&TlsVerification::SystemDefaults),
            TlsMode::System
        ));
    }

    #[tokio::test]
    async fn execute_before_activation_is_inactive() {
        let glacier = Glacier::new(GlacierConfig::new("http://localhost:8000".parse().unwrap()))
            .unwrap();
        let err = glacier.execute(Command::CheckScanStatus).await.unwrap_err();
        assert!(matches!(err, CoreError::Inactive));
    }
}
