//! Clap derive structures for the `vigil` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vigil -- mode controller and backend connectivity diagnostics
#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    version,
    about = "Inspect and exercise the vigil control plane",
    long_about = "Diagnostics for the equipment-monitoring client's control plane.\n\n\
        Probes the backend health endpoint with the configured poll profiles,\n\
        shows per-mode connectivity policies, and watches verdict changes live.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "VIGIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Poll profile to use
    #[arg(long, short = 'p', env = "VIGIL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Health endpoint URL (overrides the profile's endpoint)
    #[arg(long, short = 'e', env = "VIGIL_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Backend API key
    #[arg(long, env = "VIGIL_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VIGIL_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "VIGIL_INSECURE", global = true)]
    pub insecure: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe the backend once and report the outcome
    Check(CheckArgs),

    /// Run the monitor and stream verdict and mode changes
    Watch(WatchArgs),

    /// List configured poll profiles
    #[command(alias = "prof")]
    Profiles,

    /// Show each mode's connectivity policy
    Modes,

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Probe simulation ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MockArgs {
    /// Use the simulated backend instead of HTTP
    #[arg(long)]
    pub mock: bool,

    /// Start the simulated backend offline (implies --mock)
    #[arg(long)]
    pub mock_offline: bool,
}

impl MockArgs {
    pub fn enabled(&self) -> bool {
        self.mock || self.mock_offline
    }
}

// ── Check ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub mock: MockArgs,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g. "30s", "5m"); runs until Ctrl-C otherwise
    #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Switch into this mode once the monitor is running
    #[arg(long, short = 'm')]
    pub mode: Option<String>,

    /// Defer the first probe (overrides start_delay_ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub delay: Option<Duration>,

    /// Also print every completed probe, not just verdict changes
    #[arg(long)]
    pub checks: bool,

    #[command(flatten)]
    pub mock: MockArgs,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (secrets redacted)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
