//! Config subcommand handlers.

use dialoguer::{Input, Select};

use glacier_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("****".into());
        }
    }
    cfg
}

/// TOML-style rendering for table output.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(
        out,
        "relayout_debounce_ms = {}",
        cfg.defaults.relayout_debounce_ms
    );

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "server = \"{}\"", p.server);
        if let Some(ref url) = p.push_url {
            let _ = writeln!(out, "push_url = \"{url}\"");
        }
        if let Some(push) = p.push {
            let _ = writeln!(out, "push = {push}");
        }
        if let Some(ref token) = p.token {
            let _ = writeln!(out, "token = \"{token}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
    }

    out.trim_end().to_owned()
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(CliError::Validation {
            field: field.into(),
            reason: "must be true or false".into(),
        }),
    }
}

/// Apply `config set <key> <value>` to a profile.
fn set_key(profile: &mut Profile, key: &str, value: &str) -> Result<(), CliError> {
    match key {
        "server" => profile.server = value.into(),
        "push_url" | "push-url" => profile.push_url = Some(value.into()),
        "push" => profile.push = Some(parse_bool(key, value)?),
        "token_env" | "token-env" => profile.token_env = Some(value.into()),
        "insecure" => profile.insecure = Some(parse_bool(key, value)?),
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        "timeout" => {
            profile.timeout = Some(value.parse().map_err(|_| CliError::Validation {
                field: "timeout".into(),
                reason: "must be a number (seconds)".into(),
            })?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: server, push_url, push, \
                     token_env, insecure, ca_cert, timeout"
                ),
            });
        }
    }
    Ok(())
}

fn profile_name(global: &GlobalOpts, explicit: Option<String>, cfg: &Config) -> String {
    explicit.unwrap_or_else(|| cfg.active_profile_name(global.profile.as_deref()))
}

/// Ask for a token and store it in the keyring, or return it for plaintext.
fn prompt_token(profile_name: &str) -> Result<Option<String>, CliError> {
    let token = rpassword::prompt_password("Bearer token (empty to skip): ").map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Ok(None);
    }

    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where should the token be stored?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        glacier_config::store_token(profile_name, token.trim())?;
        eprintln!("   ✓ Token stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(token.trim().to_owned()))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = redacted(&glacier_config::load_config_or_default());
            let out = output::render_single(global.output, &cfg, format_config, |c| {
                c.default_profile.clone().unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", glacier_config::config_path().display());
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = glacier_config::load_config_or_default();
            let name = profile_name(global, None, &cfg);
            let available = cfg.available_profiles();
            let profile = cfg
                .profiles
                .get_mut(&name)
                .ok_or_else(|| CliError::ProfileNotFound {
                    name: name.clone(),
                    available,
                })?;
            set_key(profile, &key, &value)?;

            glacier_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{name}'");
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = glacier_config::load_config_or_default();
            let default = cfg.active_profile_name(None);
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: glacier config init");
            } else {
                for name in cfg.profiles.keys() {
                    let marker = if *name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = glacier_config::load_config_or_default();
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            glacier_config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetToken { profile } => {
            let cfg = glacier_config::load_config_or_default();
            let name = profile_name(global, profile, &cfg);
            cfg.profile(&name)?;

            let token = rpassword::prompt_password("Bearer token: ").map_err(prompt_err)?;
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            glacier_config::store_token(&name, token.trim())?;
            if !global.quiet {
                eprintln!("✓ Token stored in system keyring for profile '{name}'");
            }
            Ok(())
        }

        ConfigCommand::ClearToken { profile } => {
            let cfg = glacier_config::load_config_or_default();
            let name = profile_name(global, profile, &cfg);
            glacier_config::delete_token(&name)?;
            if !global.quiet {
                eprintln!("✓ Token removed from system keyring for profile '{name}'");
            }
            Ok(())
        }
    }
}

/// Interactive wizard: one profile, optional token, saved as default.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = glacier_config::config_path();
    eprintln!("glacier configuration");
    eprintln!("   Config path: {}\n", path.display());

    let mut cfg = glacier_config::load_config_or_default();

    let name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let server: String = Input::new()
        .with_prompt("Server URL")
        .default(
            global
                .server
                .clone()
                .unwrap_or_else(|| "http://localhost:8000".into()),
        )
        .interact_text()
        .map_err(prompt_err)?;

    let mut profile = Profile::new(server.trim());
    profile.token = prompt_token(&name)?;

    // Validate before writing anything.
    glacier_config::profile_to_glacier_config(&profile, &name, &cfg.defaults)?;

    cfg.profiles.insert(name.clone(), profile);
    cfg.default_profile = Some(name.clone());
    glacier_config::save_config(&cfg)?;

    eprintln!("\n✓ Profile '{name}' saved to {}", path.display());
    eprintln!("   Try: glacier topology show");
    Ok(())
}
