//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod scan;
pub mod topology;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Topology(args) => topology::handle(args, global).await,
        Command::Devices(args) => devices::handle(args, global).await,
        Command::Scan(args) => scan::handle(args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command needs no server".into()))
        }
    }
}
