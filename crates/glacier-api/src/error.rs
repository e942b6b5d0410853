use thiserror::Error;

/// Top-level error type for the `glacier-api` crate.
///
/// Covers every failure mode across both API surfaces: the REST
/// inventory and the push channel. `glacier-core` maps these into
/// user-facing messages.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// No bearer token is configured. Raised locally, before any request.
    #[error("Authentication required: no bearer token configured")]
    MissingCredential,

    /// The server rejected the bearer token (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-2xx response from the REST inventory.
    #[error("Request failed (HTTP {status} {status_text})")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    // ── Push channel ────────────────────────────────────────────────
    /// Push channel connection failed.
    #[error("Push channel connection failed: {0}")]
    PushConnect(String),

    /// Push channel closed while a request was awaiting its acknowledgement.
    #[error("Push channel closed before '{event}' was acknowledged")]
    PushClosed { event: String },

    /// Emit attempted while the push channel is not connected.
    #[error("Push channel is not connected")]
    PushUnavailable,

    /// The server did not acknowledge an emitted event in time.
    #[error("No acknowledgement for '{event}' within {timeout_ms}ms")]
    AckTimeout { event: String, timeout_ms: u64 },

    /// The server acknowledged a request with an error status.
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::PushConnect(_) | Self::AckTimeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_message_embeds_status_text() {
        let err = Error::Http {
            status: 403,
            status_text: "Forbidden".into(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "Request failed (HTTP 403 Forbidden)");
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: String::new(),
        };
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }
}
