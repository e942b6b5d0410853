// REST inventory client
//
// Wraps `reqwest::Client` with bearer-token injection, URL construction
// under `api/network/`, and status translation. Every call checks for a
// token first and fails locally without touching the network when none
// is configured.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{CreateDeviceRequest, DeviceRecord, TopologyPayload, UpdateDeviceRequest};
use crate::transport::TransportConfig;

/// HTTP client for the device inventory and topology endpoints.
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl InventoryClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the server root (e.g. `https://everyst.local:8000`);
    /// endpoint paths are resolved relative to it.
    pub fn new(
        base_url: Url,
        token: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, token))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, token: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: ensure_trailing_slash(base_url),
            token,
        }
    }

    /// Parse `base_url` and build a client around a plain `reqwest::Client`.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        token: Option<SecretString>,
    ) -> Result<Self, Error> {
        Ok(Self::with_client(http, Url::parse(base_url)?, token))
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether a bearer token is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the full topology.
    ///
    /// `GET api/network/topology/`
    pub async fn fetch_topology(&self) -> Result<TopologyPayload, Error> {
        let url = self.url("api/network/topology/")?;
        self.send(self.http.get(url)).await
    }

    /// Create a device. The server assigns id, initial status and last-seen.
    ///
    /// `POST api/network/devices/`
    pub async fn create_device(&self, req: &CreateDeviceRequest) -> Result<DeviceRecord, Error> {
        let url = self.url("api/network/devices/")?;
        debug!(label = %req.label, "creating device");
        self.send_json(self.http.post(url), req).await
    }

    /// Apply a partial edit to a device.
    ///
    /// `PATCH api/network/devices/{id}/`
    pub async fn update_device(
        &self,
        id: &str,
        req: &UpdateDeviceRequest,
    ) -> Result<DeviceRecord, Error> {
        let url = self.device_url(id, None)?;
        debug!(id, "updating device");
        self.send_json(self.http.patch(url), req).await
    }

    /// Set a device's status.
    ///
    /// `POST api/network/devices/{id}/set_status/` with `{"status": "..."}`
    pub async fn set_device_status(&self, id: &str, status: &str) -> Result<DeviceRecord, Error> {
        let url = self.device_url(id, Some("set_status"))?;
        debug!(id, status, "setting device status");
        self.send_json(self.http.post(url), &json!({ "status": status }))
            .await
    }

    /// Delete a device. The server cascades to its connections.
    ///
    /// `DELETE api/network/devices/{id}/`
    pub async fn delete_device(&self, id: &str) -> Result<(), Error> {
        let url = self.device_url(id, None)?;
        debug!(id, "deleting device");
        self.send_empty(self.http.delete(url)).await
    }

    /// Exclude a device from future scans and snapshots.
    ///
    /// `POST api/network/devices/{id}/ignore/`
    pub async fn ignore_device(&self, id: &str) -> Result<(), Error> {
        let url = self.device_url(id, Some("ignore"))?;
        debug!(id, "ignoring device");
        self.send_empty(self.http.post(url)).await
    }

    /// Re-include a previously ignored device.
    ///
    /// `POST api/network/devices/{id}/unignore/`
    pub async fn unignore_device(&self, id: &str) -> Result<(), Error> {
        let url = self.device_url(id, Some("unignore"))?;
        debug!(id, "unignoring device");
        self.send_empty(self.http.post(url)).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    fn device_url(&self, id: &str, action: Option<&str>) -> Result<Url, Error> {
        match action {
            Some(action) => self.url(&format!("api/network/devices/{id}/{action}/")),
            None => self.url(&format!("api/network/devices/{id}/")),
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorize(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, Error> {
        let token = self.token.as_ref().ok_or(Error::MissingCredential)?;
        Ok(req.bearer_auth(token.expose_secret()))
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, Error> {
        let resp = self.authorize(req)?.send().await?;
        let body = check_status(resp).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        self.send(req.json(body)).await
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<(), Error> {
        let resp = self.authorize(req)?.send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

/// Translate non-2xx responses into [`Error::Http`] / [`Error::Authentication`].
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let status_text = status.canonical_reason().unwrap_or("Unknown").to_owned();
    let body = resp.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), %status_text, "request failed");

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: format!("server returned {} {status_text}", status.as_u16()),
        });
    }

    Err(Error::Http {
        status: status.as_u16(),
        status_text,
        body,
    })
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
