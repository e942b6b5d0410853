// glacier-api: Async client for the network-topology backend (REST inventory + push channel)

pub mod error;
pub mod inventory;
pub mod models;
pub mod push;
pub mod transport;

pub use error::Error;
pub use inventory::InventoryClient;
pub use models::{
    ConnectionRecord, CreateDeviceRequest, DevicePatch, DeviceRecord, NetworkUpdate, PushEvent,
    ScanAck, ScanProgress, ScanRecord, StartScanRequest, TopologyPayload, UpdateDeviceRequest,
};
pub use push::{PushChannel, PushState, ReconnectConfig, derive_push_url};
pub use transport::{TlsMode, TransportConfig};
