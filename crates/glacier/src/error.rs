//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use glacier_config::ConfigError;
use glacier_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to server at {url}")]
    #[diagnostic(
        code(glacier::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Reason: {reason}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Push channel is not connected")]
    #[diagnostic(
        code(glacier::push_unavailable),
        help(
            "Scans are driven over the push channel.\n\
             Check the push_url of your profile, or that the server exposes /ws/."
        )
    )]
    PushUnavailable,

    #[error("Topology fetch failed: {message}")]
    #[diagnostic(code(glacier::sync_failed))]
    SyncFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(glacier::no_token),
        help(
            "Store one with: glacier config set-token --profile {profile}\n\
             Or set GLACIER_TOKEN, or token_env in the profile."
        )
    )]
    NoToken { profile: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(glacier::auth_failed),
        help("Verify the bearer token. Run: glacier config set-token")
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(glacier::not_found),
        help("Run: glacier {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("'{identifier}' matches {count} devices")]
    #[diagnostic(
        code(glacier::ambiguous),
        help("Use the device id instead. Run: glacier topology show -f {identifier}")
    )]
    Ambiguous { identifier: String, count: usize },

    // ── Server ───────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(glacier::request_failed))]
    Request { message: String },

    #[error("Rejected by server: {message}")]
    #[diagnostic(code(glacier::rejected))]
    Rejected { message: String },

    #[error("Scan failed: {message}")]
    #[diagnostic(
        code(glacier::scan_failed),
        help("Check the server logs, then retry with: glacier scan start")
    )]
    ScanFailed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(glacier::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(glacier::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: glacier config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(glacier::no_config),
        help(
            "Create a profile with: glacier config init\n\
             Or pass --server.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(glacier::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(glacier::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(glacier::timeout),
        help("Increase the limit with --timeout or check server responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    #[diagnostic(code(glacier::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(glacier::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::PushUnavailable | Self::SyncFailed { .. } => {
                exit_code::CONNECTION
            }
            Self::NoToken { .. } | Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::Ambiguous { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationMissing => CliError::NoToken {
                profile: "current".into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::Request { .. } => CliError::Request {
                message: err.to_string(),
            },
            CoreError::PushChannelUnavailable => CliError::PushUnavailable,
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "topology show".into(),
            },
            CoreError::Rejected { message } => CliError::Rejected { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Inactive => CliError::Internal("topology module is not active".into()),
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::AuthenticationMissing, exit_code::AUTH),
            (
                CoreError::DeviceNotFound {
                    identifier: "x".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::ConnectionFailed {
                    url: "http://lab".into(),
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (CoreError::Timeout { timeout_secs: 5 }, exit_code::TIMEOUT),
            (CoreError::PushChannelUnavailable, exit_code::CONNECTION),
            (
                CoreError::Rejected {
                    message: "busy".into(),
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn request_error_keeps_status_text() {
        let err = CliError::from(CoreError::Request {
            status: 502,
            status_text: "Bad Gateway".into(),
        });
        assert_eq!(err.to_string(), "Request failed: 502 Bad Gateway");
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "server".into(),
            reason: "not set".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
