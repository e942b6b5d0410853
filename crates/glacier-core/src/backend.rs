// ── Backend seams ──
//
// The engine talks to the network through three traits so the sync and
// command layers can run against in-memory fakes. `InventoryClient`
// implements the first two, `PushChannel` the third.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use glacier_api::{
    CreateDeviceRequest, DeviceRecord, Error, InventoryClient, PushChannel, PushEvent, PushState,
    TopologyPayload, UpdateDeviceRequest,
};

/// Pull-based snapshot fetch.
pub trait TopologySource: Send + Sync {
    fn fetch_topology(&self) -> BoxFuture<'_, Result<TopologyPayload, Error>>;
}

/// Device CRUD against the inventory.
pub trait DeviceInventory: Send + Sync {
    fn create_device<'a>(&'a self, req: &'a CreateDeviceRequest) -> BoxFuture<'a, Result<DeviceRecord, Error>>;

    fn update_device<'a>(
        &'a self,
        id: &'a str,
        req: &'a UpdateDeviceRequest,
    ) -> BoxFuture<'a, Result<DeviceRecord, Error>>;

    fn set_device_status<'a>(&'a self, id: &'a str, status: &'a str) -> BoxFuture<'a, Result<DeviceRecord, Error>>;

    fn delete_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    fn ignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    fn unignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>>;
}

/// Push channel: decoded events, connectivity, acknowledged emits.
pub trait PushTransport: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>>;

    fn state(&self) -> watch::Receiver<PushState>;

    fn emit<'a>(&'a self, event: &'a str, data: Value) -> BoxFuture<'a, Result<Value, Error>>;

    fn shutdown(&self);

    fn is_connected(&self) -> bool {
        self.state().borrow().is_connected()
    }
}

/// The set of backends one `Glacier` instance runs against.
#[derive(Clone)]
pub struct Backends {
    pub source: Arc<dyn TopologySource>,
    pub inventory: Arc<dyn DeviceInventory>,
    /// `None` runs without push; scans and rescans are then unavailable.
    pub push: Option<Arc<dyn PushTransport>>,
}

impl Backends {
    /// REST client for both snapshot and inventory.
    pub fn from_client(client: InventoryClient, push: Option<Arc<dyn PushTransport>>) -> Self {
        let client = Arc::new(client);
        Self {
            source: client.clone(),
            inventory: client,
            push,
        }
    }
}

// ── Real implementations ─────────────────────────────────────────────

impl TopologySource for InventoryClient {
    fn fetch_topology(&self) -> BoxFuture<'_, Result<TopologyPayload, Error>> {
        InventoryClient::fetch_topology(self).boxed()
    }
}

impl DeviceInventory for InventoryClient {
    fn create_device<'a>(&'a self, req: &'a CreateDeviceRequest) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        InventoryClient::create_device(self, req).boxed()
    }

    fn update_device<'a>(
        &'a self,
        id: &'a str,
        req: &'a UpdateDeviceRequest,
    ) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        InventoryClient::update_device(self, id, req).boxed()
    }

    fn set_device_status<'a>(&'a self, id: &'a str, status: &'a str) -> BoxFuture<'a, Result<DeviceRecord, Error>> {
        InventoryClient::set_device_status(self, id, status).boxed()
    }

    fn delete_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        InventoryClient::delete_device(self, id).boxed()
    }

    fn ignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        InventoryClient::ignore_device(self, id).boxed()
    }

    fn unignore_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        InventoryClient::unignore_device(self, id).boxed()
    }
}

impl PushTransport for PushChannel {
    fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        PushChannel::subscribe(self)
    }

    fn state(&self) -> watch::Receiver<PushState> {
        PushChannel::state(self)
    }

    fn emit<'a>(&'a self, event: &'a str, data: Value) -> BoxFuture<'a, Result<Value, Error>> {
        self.emit_with_ack(event, data).boxed()
    }

    fn shutdown(&self) {
        PushChannel::shutdown(self);
    }

    fn is_connected(&self) -> bool {
        PushChannel::is_connected(self)
    }
}
