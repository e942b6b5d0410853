// ── Core error types ──
//
// User-facing errors from glacier-core. Consumers never see raw HTTP
// responses or push frames; the `From<glacier_api::Error>` impl translates
// transport-layer failures into the variants below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Not signed in: no bearer token is configured")]
    AuthenticationMissing,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Cannot reach server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request failed: {status} {status_text}")]
    Request { status: u16, status_text: String },

    #[error("Push channel is not connected")]
    PushChannelUnavailable,

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("{message}")]
    Validation { message: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Rejected by server: {message}")]
    Rejected { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Topology module is not active")]
    Inactive,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<glacier_api::Error> for CoreError {
    fn from(err: glacier_api::Error) -> Self {
        use glacier_api::Error as Api;

        match err {
            Api::MissingCredential => CoreError::AuthenticationMissing,
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::AckTimeout { timeout_ms, .. } => CoreError::Timeout {
                timeout_secs: timeout_ms.div_ceil(1000),
            },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Http {
                status,
                status_text,
                body: _,
            } => CoreError::Request {
                status,
                status_text,
            },
            Api::PushConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("push channel: {reason}"),
            },
            Api::PushClosed { .. } | Api::PushUnavailable => CoreError::PushChannelUnavailable,
            Api::Rejected { message } => CoreError::Rejected { message },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected response: {message}"))
            }
        }
    }
}
