//! `vigil watch`: run the control plane and stream its notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use vigil_core::{ConnectivityEvent, ControlPlane, Mode, ModeEvent, ProbeOutcome, SwitchOptions};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// One streamed notification.
#[derive(Debug, Serialize)]
struct WatchLine {
    at: DateTime<Utc>,
    source: &'static str,
    event: &'static str,
    detail: String,
}

impl WatchLine {
    fn new(source: &'static str, event: &'static str, detail: String) -> Self {
        Self {
            at: Utc::now(),
            source,
            event,
            detail,
        }
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn emit(&self, line: &WatchLine) -> Result<(), CliError> {
        let out = match self.format {
            OutputFormat::Table | OutputFormat::Plain => {
                format!("{} {:<12} {}", line.at.format("%H:%M:%S%.3f"), line.event, line.detail)
            }
            _ => output::render_json(line, true)?,
        };
        output::print_output(&out, self.quiet);
        Ok(())
    }

    fn connectivity(&self, event: &ConnectivityEvent, checks: bool) -> Option<WatchLine> {
        let line = match event {
            ConnectivityEvent::VerdictChanged { previous, current } => WatchLine::new(
                "connectivity",
                "verdict",
                format!(
                    "{} -> {}",
                    output::verdict_label(*previous, self.color),
                    output::verdict_label(*current, self.color)
                ),
            ),
            ConnectivityEvent::CheckCompleted {
                outcome,
                consecutive_failures,
            } if checks => {
                let detail = match outcome {
                    ProbeOutcome::Reachable { latency } => {
                        format!("reachable in {}", output::fmt_millis(*latency))
                    }
                    ProbeOutcome::Unreachable { reason } => {
                        format!("unreachable ({consecutive_failures} in a row): {reason}")
                    }
                };
                WatchLine::new("connectivity", "check", detail)
            }
            ConnectivityEvent::ProfileChanged { previous, current } => WatchLine::new(
                "connectivity",
                "profile",
                format!("{previous} -> {current}"),
            ),
            ConnectivityEvent::DelayedStartScheduled { delay, profile } => WatchLine::new(
                "connectivity",
                "scheduled",
                format!(
                    "first probe in {}{}",
                    humantime::format_duration(*delay),
                    profile
                        .as_ref()
                        .map(|p| format!(" with profile {p}"))
                        .unwrap_or_default()
                ),
            ),
            _ => return None,
        };
        Some(line)
    }

    fn mode(event: &ModeEvent) -> Option<WatchLine> {
        let line = match event {
            ModeEvent::Changed { from, to, options } => WatchLine::new(
                "mode",
                "changed",
                if options.overlay {
                    format!("{from} -> {to} (overlay)")
                } else {
                    format!("{from} -> {to}")
                },
            ),
            ModeEvent::Blocked { mode, reason } => {
                WatchLine::new("mode", "blocked", format!("{mode}: {reason}"))
            }
            ModeEvent::Warning { mode, .. } => WatchLine::new(
                "mode",
                "warning",
                format!("{mode} entered while backend offline"),
            ),
            ModeEvent::ForcedExit { from, to, verdict } => WatchLine::new(
                "mode",
                "forced-exit",
                format!("{from} -> {to} (backend {verdict})"),
            ),
            ModeEvent::TransitionFailed {
                from,
                to,
                phase,
                message,
            } => WatchLine::new(
                "mode",
                "failed",
                format!("{from} -> {to}: {phase} hook failed: {message}"),
            ),
            ModeEvent::BeforeChange { .. } => return None,
        };
        Some(line)
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut plane_config = config::build_plane_config(global, Some(&args.mock))?;
    if args.delay.is_some() {
        plane_config.start_delay = args.delay;
    }
    let mut pending_mode = args.mode.as_deref().map(Mode::parse).transpose()?;

    let plane = ControlPlane::new(plane_config)?;
    let mut conn_rx = plane.monitor().events().subscribe();
    let mut mode_events = plane.modes().events().stream();

    let printer = Printer {
        format: global.output.clone(),
        color: output::should_color(&global.color),
        quiet: global.quiet,
    };

    plane.start()?;
    tracing::info!(
        profile = %plane.monitor().active_profile().name,
        mode = %plane.modes().current_mode(),
        "watching"
    );

    let deadline = async {
        match args.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            event = conn_rx.recv() => match event {
                Ok(event) => {
                    let completed = matches!(event, ConnectivityEvent::CheckCompleted { .. });
                    if let Some(line) = printer.connectivity(&event, args.checks) {
                        printer.emit(&line)?;
                    }
                    // Enter the requested mode once a verdict exists.
                    if completed {
                        if let Some(mode) = pending_mode.take() {
                            if let Err(e) = plane.modes().switch_mode(mode, SwitchOptions::default()).await {
                                tracing::warn!(error = %e, "requested mode not entered");
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "output lagged"),
                Err(RecvError::Closed) => break,
            },
            Some(event) = mode_events.next() => match event {
                Ok(event) => {
                    if let Some(line) = Printer::mode(&event) {
                        printer.emit(&line)?;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "output lagged");
                }
            },
        }
    }

    plane.shutdown().await;

    let status = plane.monitor().status();
    if matches!(printer.format, OutputFormat::Table) && !global.quiet {
        let rate = status
            .success_rate()
            .map_or_else(|| "n/a".into(), |r| format!("{:.0}%", r * 100.0));
        eprintln!(
            "{} checks, {} succeeded ({rate}), final verdict {}",
            status.total_checks,
            status.successful_checks,
            output::verdict_label(status.verdict, printer.color)
        );
    }
    Ok(())
}
