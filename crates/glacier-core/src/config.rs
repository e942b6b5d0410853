// ── Runtime configuration ──
//
// Describes how to reach the topology server and how the engine behaves.
// Carries credential data but never touches disk; glacier-config (or a
// test) builds a `GlacierConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;
use crate::layout::LayoutConfig;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab servers).
    DangerAcceptInvalid,
}

/// Push channel settings.
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// Connect the push channel on activation.
    pub enabled: bool,
    /// Explicit endpoint; derived from the server URL when `None`.
    pub url: Option<Url>,
    /// How long an emitted request waits for its acknowledgement.
    pub ack_timeout: Duration,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            ack_timeout: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Configuration for one topology module instance.
#[derive(Debug, Clone)]
pub struct GlacierConfig {
    /// Server root (e.g. `https://everyst.local:8000`).
    pub url: Url,
    /// Bearer token. Absence is legal: mutating commands then fail locally.
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// REST request timeout.
    pub timeout: Duration,
    pub push: PushSettings,
    pub layout: LayoutConfig,
    /// Quiet period before a burst of topology changes triggers relayout.
    pub relayout_debounce: Duration,
}

impl GlacierConfig {
    /// Defaults for everything except the server URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            push: PushSettings::default(),
            layout: LayoutConfig::default(),
            relayout_debounce: Duration::from_millis(100),
        }
    }

    /// The push endpoint: explicit, or `ws(s)://<host>/ws/` derived from `url`.
    pub fn push_url(&self) -> Result<Url, CoreError> {
        match self.push.url {
            Some(ref url) => Ok(url.clone()),
            None => Ok(glacier_api::derive_push_url(&self.url)?),
        }
    }
}
