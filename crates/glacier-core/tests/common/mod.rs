// In-memory backends for driving `Glacier` without a server.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};

use glacier_api::{
    CreateDeviceRequest, DeviceRecord, Error, PushEvent, PushState, TopologyPayload,
    UpdateDeviceRequest,
};
use glacier_core::{
    Backends, DeviceInventory, EntityId, Glacier, GlacierConfig, GlacierState, LayeredLayout,
    LayoutConfig, LayoutEdge, LayoutEngine, LayoutError, LayoutStrategy, Position, PushTransport,
    TopologySource,
};

// ── Snapshot source ──────────────────────────────────────────────────

struct Scripted {
    delay: Duration,
    result: Result<TopologyPayload, Error>,
}

/// Serves scripted fetch results in order, then `fallback` forever.
#[derive(Default)]
pub struct FakeSource {
    fetches: AtomicUsize,
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<TopologyPayload>,
}

impl FakeSource {
    pub fn new(fallback: Value) -> Self {
        let source = Self::default();
        source.set_fallback(fallback);
        source
    }

    pub fn set_fallback(&self, payload: Value) {
        *self.fallback.lock().unwrap() = serde_json::from_value(payload).unwrap();
    }

    pub fn push_ok(&self, delay: Duration, payload: Value) {
        self.script.lock().unwrap().push_back(Scripted {
            delay,
            result: Ok(serde_json::from_value(payload).unwrap()),
        });
    }

    pub fn push_err(&self, error: Error) {
        self.script.lock().unwrap().push_back(Scripted {
            delay: Duration::ZERO,
            result: Err(error),
        });
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TopologySource for FakeSource {
    fn fetch_topology(&self) -> BoxFuture<'_, Result<TopologyPayload, Error>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let fallback = self.fallback.lock().unwrap().clone();
        async move {
            match next {
                Some(scripted) => {
                    tokio::time::sleep(scripted.delay).await;
                    scripted.result
                }
                None => Ok(fallback),
            }
        }
        .boxed()
    }
}

// ── Inventory ────────────────────────────────────────────────────────

/// Records every call and echoes plausible device records.
#[derive(Default)]
pub struct FakeInventory {
    calls: Mutex<Vec<String>>,
}

impl FakeInventory {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn device_record(value: Value) -> DeviceRecord {
    serde_json::from_value(value).unwrap()
}

impl DeviceInventory for FakeInventory {
    fn create_device<'a>(
        &'a self,
        req: &'a CreateDeviceRequest,
    ) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        self.record(format!("create {}", req.label));
        let record = device_record(json!({
            "id": "new-1",
            "label": req.label,
            "type": req.device_type,
            "ip": req.ip,
            "status": "online",
        }));
        async move { Ok(record) }.boxed()
    }

    fn update_device<'a>(
        &'a self,
        id: &'a str,
        req: &'a UpdateDeviceRequest,
    ) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        self.record(format!("update {id}"));
        let record = device_record(json!({
            "id": id,
            "label": req.label.clone().unwrap_or_else(|| format!("dev-{id}")),
            "status": "online",
        }));
        async move { Ok(record) }.boxed()
    }

    fn set_device_status<'a>(
        &'a self,
        id: &'a str,
        status: &'a str,
    ) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        self.record(format!("status {id} {status}"));
        let record = device_record(json!({
            "id": id,
            "label": format!("dev-{id}"),
            "status": status,
        }));
        async move { Ok(record) }.boxed()
    }

    fn delete_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        self.record(format!("delete {id}"));
        async move { Ok(()) }.boxed()
    }

    fn ignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        self.record(format!("ignore {id}"));
        async move { Ok(()) }.boxed()
    }

    fn unignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        self.record(format!("unignore {id}"));
        async move { Ok(()) }.boxed()
    }
}

// ── Push ─────────────────────────────────────────────────────────────

/// Push transport driven by the test: state, inbound events and acks.
pub struct FakePush {
    state: watch::Sender<PushState>,
    events: broadcast::Sender<Arc<PushEvent>>,
    emitted: Mutex<Vec<(String, Value)>>,
    acks: Mutex<HashMap<String, Value>>,
}

impl Default for FakePush {
    fn default() -> Self {
        let (state, _) = watch::channel(PushState::Connecting);
        let (events, _) = broadcast::channel(64);
        Self {
            state,
            events,
            emitted: Mutex::new(Vec::new()),
            acks: Mutex::new(HashMap::new()),
        }
    }
}

impl FakePush {
    pub fn set_state(&self, state: PushState) {
        self.state.send_replace(state);
    }

    pub fn connected() -> Self {
        let push = Self::default();
        push.set_state(PushState::Connected);
        push
    }

    /// Deliver an inbound event as the server would.
    pub fn deliver(&self, event: &str, data: Value) {
        let _ = self.events.send(Arc::new(PushEvent::decode(event, data)));
    }

    /// Acknowledge `event` with `ack` instead of `{status: "success"}`.
    pub fn ack_with(&self, event: &str, ack: Value) {
        self.acks.lock().unwrap().insert(event.to_owned(), ack);
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }
}

impl PushTransport for FakePush {
    fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.events.subscribe()
    }

    fn state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    fn emit<'a>(&'a self, event: &'a str, data: Value) -> BoxFuture<'a, Result<Value, Error>> {
        let result = if self.state.borrow().is_connected() {
            self.emitted
                .lock()
                .unwrap()
                .push((event.to_owned(), data));
            Ok(self
                .acks
                .lock()
                .unwrap()
                .get(event)
                .cloned()
                .unwrap_or_else(|| json!({ "status": "success" })))
        } else {
            Err(Error::PushUnavailable)
        };
        async move { result }.boxed()
    }

    fn shutdown(&self) {
        self.set_state(PushState::Disconnected);
    }
}

// ── Layout ───────────────────────────────────────────────────────────

/// Layered layout that counts its invocations.
#[derive(Default)]
pub struct CountingLayout {
    calls: AtomicUsize,
}

impl CountingLayout {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LayoutStrategy for CountingLayout {
    fn layout(&self, nodes: &[EntityId], edges: &[LayoutEdge]) -> Result<Vec<Position>, LayoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        LayeredLayout::new(LayoutConfig::default()).layout(nodes, edges)
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub fn config() -> GlacierConfig {
    let mut config = GlacierConfig::new("http://everyst.test:8000".parse().unwrap());
    config.token = Some(SecretString::from("test-token".to_owned()));
    config.push.enabled = false;
    config
}

pub struct Harness {
    pub glacier: Glacier,
    pub source: Arc<FakeSource>,
    pub inventory: Arc<FakeInventory>,
    pub push: Arc<FakePush>,
    pub layout: Arc<CountingLayout>,
}

impl Harness {
    pub fn new(config: GlacierConfig, snapshot: Value) -> Self {
        Self::with_push(config, snapshot, FakePush::connected())
    }

    pub fn with_push(config: GlacierConfig, snapshot: Value, push: FakePush) -> Self {
        let source = Arc::new(FakeSource::new(snapshot));
        let inventory = Arc::new(FakeInventory::default());
        let push = Arc::new(push);
        let layout = Arc::new(CountingLayout::default());

        let backends = Backends {
            source: source.clone(),
            inventory: inventory.clone(),
            push: Some(push.clone()),
        };
        let glacier = Glacier::with_backends(config, backends)
            .with_layout(LayoutEngine::new(layout.clone()));

        Self {
            glacier,
            source,
            inventory,
            push,
            layout,
        }
    }

    /// Activate and wait for the first snapshot and the push mirror.
    pub async fn start(&self) {
        self.glacier.activate().await.unwrap();
        let connected = self.push.state.borrow().is_connected();
        self.settle(|s| !s.loading && (!connected || s.push.is_connected()))
            .await;
    }

    /// Wait (in virtual time) until `predicate` holds.
    pub async fn settle(&self, predicate: impl FnMut(&GlacierState) -> bool) -> Arc<GlacierState> {
        let mut stream = self.glacier.subscribe();
        tokio::time::timeout(Duration::from_secs(30), stream.wait_for(predicate))
            .await
            .expect("state never settled")
            .unwrap()
    }

    /// Let timers and queued messages run.
    pub async fn idle(&self) {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

pub fn device(id: &str) -> Value {
    json!({ "id": id, "label": format!("dev-{id}"), "type": "workstation", "status": "online" })
}

pub fn link(source: &str, target: &str) -> Value {
    json!({ "source": source, "target": target, "status": "active" })
}

pub fn snapshot(devices: Vec<Value>, connections: Vec<Value>) -> Value {
    json!({ "devices": devices, "connections": connections })
}
