//! Command dispatch: bridges CLI args -> control plane -> output formatting.

pub mod check;
pub mod config_cmd;
pub mod modes;
pub mod profiles;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that resolves poll profiles or mode policies.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Check(args) => check::handle(args, global).await,
        Command::Watch(args) => watch::handle(args, global).await,
        Command::Profiles => profiles::handle(global),
        Command::Modes => modes::handle(global),
        // Handled in main before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
