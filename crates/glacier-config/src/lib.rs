//! Configuration for glacier tools.
//!
//! TOML profiles, bearer-token resolution (env var, keyring, plaintext)
//! and translation to `glacier_core::GlacierConfig`. Core never reads
//! these types; the binary layers its own flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use glacier_core::{GlacierConfig, TlsVerification};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "glacier";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Quiet period before a relayout, in milliseconds.
    #[serde(default = "default_relayout_debounce")]
    pub relayout_debounce_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            relayout_debounce_ms: default_relayout_debounce(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_relayout_debounce() -> u64 {
    100
}

/// A named server profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://everyst.local:8000").
    pub server: String,

    /// Push endpoint; derived from `server` when absent.
    pub push_url: Option<String>,

    /// Connect the push channel. Defaults to true.
    pub push: Option<bool>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Accept self-signed certificates.
    pub insecure: Option<bool>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override the default timeout (seconds).
    pub timeout: Option<u64>,
}

impl Profile {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }
}

impl Config {
    /// Resolve the active profile name: explicit choice, then
    /// `default_profile`, then `"default"`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(ToOwned::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.available_profiles(),
            })
    }

    /// Comma-separated profile names, or `(none)`.
    pub fn available_profiles(&self) -> String {
        if self.profiles.is_empty() {
            "(none)".into()
        } else {
            self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "everyst", "glacier").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("glacier");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` merged over defaults, then `GLACIER_*` env vars.
///
/// Nested keys use a double underscore: `GLACIER_DEFAULTS__TIMEOUT=5`.
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("GLACIER_").split("__"));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `token_env` → keyring → plaintext.
///
/// Absence is not an error; mutating commands then fail locally.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_token_with(
        profile,
        profile_name,
        |var| std::env::var(var).ok(),
        keyring_token,
    )
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    let non_empty = |s: String| (!s.trim().is_empty()).then_some(s);

    if let Some(token) = profile.token_env.as_deref().and_then(&env).and_then(non_empty) {
        debug!(profile = profile_name, "token from environment");
        return Some(SecretString::from(token));
    }

    if let Some(token) = keyring(profile_name).and_then(non_empty) {
        debug!(profile = profile_name, "token from keyring");
        return Some(SecretString::from(token));
    }

    profile
        .token
        .clone()
        .and_then(non_empty)
        .map(SecretString::from)
}

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

fn keyring_token(profile_name: &str) -> Option<String> {
    keyring_entry(profile_name).ok()?.get_password().ok()
}

/// Store a bearer token in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

/// Remove a stored token. Succeeds if none was stored.
pub fn delete_token(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `GlacierConfig` from a profile, resolving its token.
pub fn profile_to_glacier_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<GlacierConfig, ConfigError> {
    let token = resolve_token(profile, profile_name);
    build_glacier_config(profile, defaults, token)
}

fn build_glacier_config(
    profile: &Profile,
    defaults: &Defaults,
    token: Option<SecretString>,
) -> Result<GlacierConfig, ConfigError> {
    let url = parse_url("server", &profile.server, &["http", "https"])?;

    let mut config = GlacierConfig::new(url);
    config.token = token;

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.relayout_debounce = Duration::from_millis(defaults.relayout_debounce_ms);

    config.push.enabled = profile.push.unwrap_or(true);
    if let Some(ref raw) = profile.push_url {
        config.push.url = Some(parse_url("push_url", raw, &["ws", "wss"])?);
    }

    Ok(config)
}

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Validation {
        field: field.into(),
        reason,
    };
    if raw.trim().is_empty() {
        return Err(invalid("not set".into()));
    }
    let url: Url = raw
        .parse()
        .map_err(|_| invalid(format!("invalid URL: {raw}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!(
            "expected {} URL, got '{}'",
            schemes.join("/"),
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn exposed(token: Option<SecretString>) -> Option<String> {
        token.map(|t| t.expose_secret().to_owned())
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    // ── Loading ──────────────────────────────────────────────────────

    #[test]
    fn loads_profiles_from_toml() {
        let (_dir, path) = write_config(
            r#"
            default_profile = "lab"

            [defaults]
            timeout = 5

            [profiles.lab]
            server = "https://everyst.lab:8000"
            token_env = "LAB_TOKEN"
            insecure = true
            "#,
        );

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("lab"));
        assert_eq!(config.defaults.timeout, 5);
        assert_eq!(config.defaults.output, "table");

        let lab = config.profile("lab").unwrap();
        assert_eq!(lab.server, "https://everyst.lab:8000");
        assert_eq!(lab.token_env.as_deref(), Some("LAB_TOKEN"));
        assert_eq!(lab.insecure, Some(true));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.defaults, Defaults::default());
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        let mut profile = Profile::new("http://10.0.0.2:8000");
        profile.push = Some(false);
        config.profiles.insert("default".into(), profile.clone());
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profile("default").unwrap(), &profile);
    }

    // ── Profiles ─────────────────────────────────────────────────────

    #[test]
    fn explicit_profile_beats_default() {
        let config = Config {
            default_profile: Some("home".into()),
            ..Config::default()
        };
        assert_eq!(config.active_profile_name(Some("lab")), "lab");
        assert_eq!(config.active_profile_name(None), "home");

        let bare = Config {
            default_profile: None,
            ..Config::default()
        };
        assert_eq!(bare.active_profile_name(None), "default");
    }

    #[test]
    fn unknown_profile_lists_available() {
        let mut config = Config::default();
        config.profiles.insert("b".into(), Profile::new("http://b"));
        config.profiles.insert("a".into(), Profile::new("http://a"));

        let err = config.profile("c").unwrap_err();
        assert_eq!(
            err.to_string(),
            "profile 'c' not found (available: a, b)"
        );
    }

    // ── Token chain ──────────────────────────────────────────────────

    fn profile_with_tokens() -> Profile {
        Profile {
            token: Some("plain".into()),
            token_env: Some("LAB_TOKEN".into()),
            ..Profile::new("http://lab")
        }
    }

    #[test]
    fn env_token_wins() {
        let token = resolve_token_with(
            &profile_with_tokens(),
            "lab",
            |var| (var == "LAB_TOKEN").then(|| "from-env".into()),
            |_| Some("from-keyring".into()),
        );
        assert_eq!(exposed(token).as_deref(), Some("from-env"));
    }

    #[test]
    fn keyring_beats_plaintext() {
        let token = resolve_token_with(
            &profile_with_tokens(),
            "lab",
            |_| None,
            |profile| (profile == "lab").then(|| "from-keyring".into()),
        );
        assert_eq!(exposed(token).as_deref(), Some("from-keyring"));
    }

    #[test]
    fn blank_sources_fall_through_to_plaintext() {
        let token = resolve_token_with(
            &profile_with_tokens(),
            "lab",
            |_| Some("  ".into()),
            |_| Some(String::new()),
        );
        assert_eq!(exposed(token).as_deref(), Some("plain"));
    }

    #[test]
    fn no_token_anywhere_is_none() {
        let token = resolve_token_with(&Profile::new("http://lab"), "lab", |_| None, |_| None);
        assert!(token.is_none());
    }

    // ── Translation ──────────────────────────────────────────────────

    #[test]
    fn translation_applies_profile_and_defaults() {
        let defaults = Defaults {
            timeout: 12,
            relayout_debounce_ms: 250,
            ..Defaults::default()
        };
        let profile = Profile {
            push_url: Some("ws://10.0.0.3:9000/ws/".into()),
            ..Profile::new("https://everyst.local:8000")
        };

        let config = build_glacier_config(&profile, &defaults, None).unwrap();
        assert_eq!(config.url.as_str(), "https://everyst.local:8000/");
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.relayout_debounce, Duration::from_millis(250));
        assert!(config.push.enabled);
        assert_eq!(
            config.push_url().unwrap().as_str(),
            "ws://10.0.0.3:9000/ws/"
        );
        assert!(config.token.is_none());
    }

    #[test]
    fn tls_mode_follows_insecure_then_ca() {
        let defaults = Defaults::default();

        let insecure = Profile {
            insecure: Some(true),
            ca_cert: Some("/etc/ca.pem".into()),
            ..Profile::new("https://lab")
        };
        let config = build_glacier_config(&insecure, &defaults, None).unwrap();
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);

        let custom = Profile {
            ca_cert: Some("/etc/ca.pem".into()),
            ..Profile::new("https://lab")
        };
        let config = build_glacier_config(&custom, &defaults, None).unwrap();
        assert_eq!(config.tls, TlsVerification::CustomCa("/etc/ca.pem".into()));
    }

    #[test]
    fn profile_timeout_overrides_default() {
        let profile = Profile {
            timeout: Some(3),
            push: Some(false),
            ..Profile::new("http://lab")
        };
        let config = build_glacier_config(&profile, &Defaults::default(), None).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(!config.push.enabled);
    }

    #[test]
    fn rejects_bad_urls() {
        let defaults = Defaults::default();

        let err = build_glacier_config(&Profile::new(""), &defaults, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "server"));

        let err = build_glacier_config(&Profile::new("ftp://lab"), &defaults, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid server: expected http/https URL, got 'ftp'"
        );

        let push = Profile {
            push_url: Some("http://lab/ws/".into()),
            ..Profile::new("http://lab")
        };
        let err = build_glacier_config(&push, &defaults, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "push_url"));
    }
}
