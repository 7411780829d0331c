mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Keep the raw matches: value sources decide whether config
    // defaults may fill in display flags.
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli, &matches).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Log to stderr so stdout stays clean for piped output.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(mut cli: Cli, matches: &ArgMatches) -> Result<(), CliError> {
    if let Command::Completions(ref args) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(args.shell, &mut cmd, "vigil", &mut std::io::stdout());
        return Ok(());
    }

    // A broken file is reported by the command that needs it.
    let file = vigil_config::load_config_or_default(cli.global.config.as_deref());
    config::apply_display_defaults(&mut cli.global, matches, &file.defaults)?;

    match cli.command {
        // Config inspection never builds a monitor
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        cmd => {
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &cli.global).await
        }
    }
}
