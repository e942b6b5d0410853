//! Clap derive structures for the `glacier` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Kept
//! free of workspace crates so `build.rs` can render man pages from it.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// glacier -- live network topology from the command line
#[derive(Debug, Parser)]
#[command(
    name = "glacier",
    version,
    about = "Inspect and manage the network topology of an everyst server",
    long_about = "Fetches the discovered network topology, lays it out in ranks,\n\
        follows live updates over the push channel and drives discovery scans.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "GLACIER_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server URL (overrides profile)
    #[arg(long, short = 's', env = "GLACIER_SERVER", global = true)]
    pub server: Option<String>,

    /// Bearer token (overrides profile, keyring and token_env)
    #[arg(long, env = "GLACIER_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "GLACIER_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "GLACIER_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "GLACIER_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Color if stdout is a terminal and NO_COLOR is unset
    Auto,
    Always,
    Never,
}

/// Device category as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKindArg {
    Server,
    Workstation,
    Router,
    Switch,
    Firewall,
    Other,
}

/// Device status as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceStatusArg {
    Online,
    Offline,
    Warning,
    Error,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the laid-out topology or follow it live
    #[command(alias = "topo", alias = "t")]
    Topology(TopologyArgs),

    /// Create, edit and remove devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Start, cancel and clean up discovery scans
    Scan(ScanArgs),

    /// Manage configuration profiles and tokens
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TOPOLOGY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TopologyArgs {
    #[command(subcommand)]
    pub command: TopologyCommand,
}

#[derive(Debug, Subcommand)]
pub enum TopologyCommand {
    /// List devices with their layout coordinates
    #[command(alias = "ls")]
    Show(FilterArgs),

    /// List connections between known devices
    #[command(alias = "links")]
    Connections,

    /// Follow live updates and scan progress
    Watch {
        /// Stop after this long (e.g. "30s", "5m"); runs until Ctrl-C otherwise
        #[arg(long = "for", value_name = "DURATION", value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
    },
}

/// Search and filter flags shared by listing commands.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Case-insensitive match on label, IP, hostname, MAC or tag
    #[arg(long, short = 'f')]
    pub search: Option<String>,

    /// Only devices with this status
    #[arg(long)]
    pub status: Option<DeviceStatusArg>,

    /// Only devices of this category
    #[arg(long)]
    pub kind: Option<DeviceKindArg>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// Show one device
    Get {
        /// Device id, label, IP or MAC
        device: String,
    },

    /// Add a device manually
    Create {
        /// Display label
        #[arg(required_unless_present = "from_file")]
        label: Option<String>,

        #[command(flatten)]
        fields: DeviceFields,

        /// Read the device from a JSON file instead
        #[arg(long, short = 'F', conflicts_with = "label")]
        from_file: Option<PathBuf>,
    },

    /// Change a device's fields
    Edit {
        /// Device id, label, IP or MAC
        device: String,

        /// New label
        #[arg(long)]
        label: Option<String>,

        #[command(flatten)]
        fields: DeviceFields,

        /// Read the changes from a JSON file instead
        #[arg(long, short = 'F')]
        from_file: Option<PathBuf>,
    },

    /// Flip a device between online and offline
    Toggle {
        /// Device id, label, IP or MAC
        device: String,
    },

    /// Set a device's status explicitly
    Status {
        /// Device id, label, IP or MAC
        device: String,

        status: DeviceStatusArg,
    },

    /// Delete a device and its connections
    #[command(alias = "rm")]
    Remove {
        /// Device id, label, IP or MAC
        device: String,
    },

    /// Scan only this device's address
    Rescan {
        /// Device id, label, IP or MAC
        device: String,

        /// Follow the scan until it finishes
        #[arg(long, short = 'w')]
        wait: bool,
    },

    /// Hide a device from the topology
    Ignore {
        /// Device id, label, IP or MAC
        device: String,
    },

    /// Show a previously ignored device again
    Unignore {
        /// Device id
        device: String,
    },
}

/// Optional device fields shared by create and edit.
#[derive(Debug, Args)]
pub struct DeviceFields {
    /// Device category
    #[arg(long)]
    pub kind: Option<DeviceKindArg>,

    /// IP address
    #[arg(long)]
    pub ip: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    /// MAC address
    #[arg(long)]
    pub mac: Option<String>,

    /// Tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SCAN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(subcommand)]
    pub command: ScanCommand,
}

#[derive(Debug, Subcommand)]
pub enum ScanCommand {
    /// Start a network discovery scan
    Start {
        /// Address range, e.g. 192.168.1.0/24 (server default otherwise)
        #[arg(long, short = 'r')]
        range: Option<String>,

        /// Follow the scan until it finishes
        #[arg(long, short = 'w')]
        wait: bool,
    },

    /// Cancel the running scan
    Cancel,

    /// Ask the server to clean up interrupted scans
    Check,

    /// Show the current scan state
    Status,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a config file with guided setup
    Init,

    /// Display the current configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a value on the active profile
    Set {
        /// One of: server, push_url, push, token_env, insecure, ca_cert, timeout
        key: String,

        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },

    /// Remove a stored bearer token from the system keyring
    ClearToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
