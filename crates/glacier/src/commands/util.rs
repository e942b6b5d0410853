//! Shared helpers for command handlers: session setup, device lookup,
//! confirmation prompts and argument conversion.

use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use glacier_config::Profile;
use glacier_core::{
    Command, CommandResult, CoreError, DeviceKind, DeviceStatus, EntityId, Glacier, GlacierConfig,
    GlacierState, ScanPhase, Topology,
};

use crate::cli::{DeviceKindArg, DeviceStatusArg, GlobalOpts};
use crate::error::CliError;

// ── Session ─────────────────────────────────────────────────────────

/// What a command needs from the server before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needs {
    /// The first snapshot only; the push channel stays closed.
    Snapshot,
    /// The first snapshot; push connects in the background.
    Live,
    /// The first snapshot and a connected push channel.
    Push,
}

/// An activated topology module bound to one profile.
pub struct Session {
    pub glacier: Glacier,
    pub profile: String,
}

impl Session {
    /// Build the config, activate, and wait for what `needs` requires.
    pub async fn open(global: &GlobalOpts, needs: Needs) -> Result<Self, CliError> {
        let (mut config, profile) = build_glacier_config(global)?;
        config.push.enabled &= needs != Needs::Snapshot;
        let limit = config.timeout;

        let glacier = Glacier::new(config)?;
        glacier.activate().await?;
        let session = Self { glacier, profile };

        let state = session.wait_for(limit, |s| !s.loading).await?;
        if let Some(message) = initial_fetch_failure(&state) {
            session.close().await;
            return Err(CliError::SyncFailed { message });
        }

        if needs == Needs::Push
            && session
                .wait_for(limit, |s| s.push.is_connected())
                .await
                .is_err()
        {
            session.close().await;
            return Err(CliError::PushUnavailable);
        }

        tracing::debug!(
            profile = %session.profile,
            devices = state.topology.devices.len(),
            "session ready"
        );
        Ok(session)
    }

    /// Wait up to `limit` for `predicate` to hold.
    pub async fn wait_for(
        &self,
        limit: Duration,
        predicate: impl FnMut(&GlacierState) -> bool,
    ) -> Result<std::sync::Arc<GlacierState>, CliError> {
        let mut stream = self.glacier.subscribe();
        match tokio::time::timeout(limit, stream.wait_for(predicate)).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(CliError::Internal("state channel closed".into())),
            Err(_) => Err(CliError::Timeout {
                seconds: limit.as_secs(),
            }),
        }
    }

    /// Run a command, naming the active profile when no token is set.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CliError> {
        self.glacier.execute(cmd).await.map_err(|e| match e {
            CoreError::AuthenticationMissing => CliError::NoToken {
                profile: self.profile.clone(),
            },
            other => other.into(),
        })
    }

    pub async fn close(self) {
        self.glacier.deactivate().await;
    }
}

/// The error message when the first fetch failed and nothing was loaded.
fn initial_fetch_failure(state: &GlacierState) -> Option<String> {
    if state.topology.is_empty() && state.scan != ScanPhase::StaleDetected {
        state.error.clone()
    } else {
        None
    }
}

/// Resolve profile + flags into a `GlacierConfig`.
///
/// Flags win over the profile; without any profile, `--server` alone is
/// enough to build one.
pub fn build_glacier_config(global: &GlobalOpts) -> Result<(GlacierConfig, String), CliError> {
    let cfg = glacier_config::load_config_or_default();
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.server.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: cfg.available_profiles(),
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: glacier_config::config_path().display().to_string(),
            });
        }
    };

    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let mut config =
        glacier_config::profile_to_glacier_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(ref token) = global.token {
        config.token = Some(SecretString::from(token.clone()));
    }
    Ok((config, profile_name))
}

// ── Device lookup ───────────────────────────────────────────────────

/// Resolve a device by id, then by label, IP or MAC.
pub fn resolve_device(topology: &Topology, identifier: &str) -> Result<EntityId, CliError> {
    let id = EntityId::from(identifier);
    if topology.devices.contains_key(&id) {
        return Ok(id);
    }

    let needle = identifier.trim();
    let mac = glacier_core::MacAddress::new(needle);
    let matches: Vec<&EntityId> = topology
        .devices
        .values()
        .filter(|d| {
            d.label.eq_ignore_ascii_case(needle)
                || d.ip.is_some_and(|ip| ip.to_string() == needle)
                || d.mac.as_ref() == Some(&mac)
        })
        .map(|d| &d.id)
        .collect();

    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        [] => Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "topology show".into(),
        }),
        many => Err(CliError::Ambiguous {
            identifier: identifier.into(),
            count: many.len(),
        }),
    }
}

// ── Prompts and input ───────────────────────────────────────────────

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool, action: &str) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Read and parse a JSON file for `--from-file` flags.
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn parse_ip(raw: &str) -> Result<IpAddr, CliError> {
    raw.trim().parse().map_err(|_| CliError::Validation {
        field: "ip".into(),
        reason: format!("'{raw}' is not an IP address"),
    })
}

/// Relative age like "3m 12s ago".
pub fn ago(at: chrono::DateTime<chrono::Utc>) -> String {
    let elapsed = chrono::Utc::now().signed_duration_since(at);
    match elapsed.to_std() {
        Ok(d) => format!(
            "{} ago",
            humantime::format_duration(Duration::from_secs(d.as_secs()))
        ),
        Err(_) => "just now".into(),
    }
}

// ── Argument conversion ─────────────────────────────────────────────

impl From<DeviceKindArg> for DeviceKind {
    fn from(arg: DeviceKindArg) -> Self {
        match arg {
            DeviceKindArg::Server => Self::Server,
            DeviceKindArg::Workstation => Self::Workstation,
            DeviceKindArg::Router => Self::Router,
            DeviceKindArg::Switch => Self::Switch,
            DeviceKindArg::Firewall => Self::Firewall,
            DeviceKindArg::Other => Self::Other,
        }
    }
}

impl From<DeviceStatusArg> for DeviceStatus {
    fn from(arg: DeviceStatusArg) -> Self {
        match arg {
            DeviceStatusArg::Online => Self::Online,
            DeviceStatusArg::Offline => Self::Offline,
            DeviceStatusArg::Warning => Self::Warning,
            DeviceStatusArg::Error => Self::Error,
        }
    }
}
