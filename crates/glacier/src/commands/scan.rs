//! Scan command handlers and the progress bar shared with `watch`.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use glacier_core::{Command, CommandResult, ScanDescriptor, ScanOutcome, ScanPhase};

use crate::cli::{GlobalOpts, ScanArgs, ScanCommand};
use crate::error::CliError;
use crate::output;

use super::util::{Needs, Session};

// ── Progress bar ────────────────────────────────────────────────────

/// Mirrors `ScanPhase::Scanning` onto an indicatif bar.
pub struct ScanProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ScanProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    pub fn update(&mut self, phase: &ScanPhase) {
        let ScanPhase::Scanning(active) = phase else {
            self.finish();
            return;
        };
        let quiet = self.quiet;
        let bar = self.bar.get_or_insert_with(|| new_bar(quiet));

        if active.estimated {
            bar.set_position(0);
            bar.set_message("scan in progress (progress unknown)");
        } else {
            bar.set_position(percent(active.progress));
            let message = match (active.message.as_deref(), active.discovered_devices) {
                (Some(m), _) => m.to_owned(),
                (None, Some(n)) => format!("{n} devices found"),
                (None, None) => String::new(),
            };
            bar.set_message(message);
        }
    }

    /// Print a line without tearing the bar.
    pub fn println(&self, line: &str) {
        match self.bar {
            Some(ref bar) => bar.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn new_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let bar = ProgressBar::new(100).with_style(style);
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn percent(progress: f64) -> u64 {
    progress.clamp(0.0, 100.0).round() as u64
}

/// One-line description of a scan phase.
pub fn describe_phase(phase: &ScanPhase) -> String {
    match phase {
        ScanPhase::Loading => "loading".into(),
        ScanPhase::Idle { outcome: None } => "idle".into(),
        ScanPhase::Idle {
            outcome: Some(outcome),
        } => format!("idle, {}", describe_outcome(outcome)),
        ScanPhase::Scanning(active) if active.estimated => "scanning".into(),
        ScanPhase::Scanning(active) => format!("scanning {}%", percent(active.progress)),
        ScanPhase::StaleDetected => "interrupted scan detected".into(),
    }
}

fn describe_outcome(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Completed {
            discovered_devices: Some(n),
        } => format!("last scan completed ({n} devices)"),
        ScanOutcome::Completed { .. } => "last scan completed".into(),
        ScanOutcome::Failed { message } => format!("last scan failed: {message}"),
        ScanOutcome::Cancelled => "last scan cancelled".into(),
    }
}

// ── Following a scan ────────────────────────────────────────────────

/// Follow the running scan until it leaves `Scanning`. `None` when the
/// user stopped following with Ctrl-C; the scan keeps running.
pub async fn follow(session: &Session, quiet: bool) -> Result<Option<ScanOutcome>, CliError> {
    let mut stream = session.glacier.subscribe();
    let mut progress = ScanProgress::new(quiet);
    let mut state = stream.latest();

    let outcome = loop {
        progress.update(&state.scan);
        match state.scan {
            ScanPhase::Scanning(_) | ScanPhase::Loading => {}
            ScanPhase::Idle {
                outcome: Some(ref outcome),
            } => break Ok(Some(outcome.clone())),
            ScanPhase::Idle { outcome: None } | ScanPhase::StaleDetected => {
                break Err(CliError::Rejected {
                    message: state
                        .error
                        .clone()
                        .unwrap_or_else(|| "the scan is no longer running".into()),
                });
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                progress.finish();
                if !quiet {
                    eprintln!("Stopped following; the scan continues on the server.");
                }
                return Ok(None);
            }
            next = stream.changed() => match next {
                Some(next) => state = next,
                None => break Err(CliError::Internal("state channel closed".into())),
            },
        }
    };

    progress.finish();
    outcome
}

/// Turn a followed outcome into the command result.
pub fn report(outcome: Option<ScanOutcome>, quiet: bool) -> Result<(), CliError> {
    match outcome {
        Some(ScanOutcome::Failed { message }) => Err(CliError::ScanFailed { message }),
        Some(outcome) => {
            if !quiet {
                eprintln!("✓ {}", describe_outcome(&outcome).replacen("last scan", "Scan", 1));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

// ── Views ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StartedView {
    scan_id: Option<String>,
    job_id: Option<String>,
}

#[derive(Serialize)]
struct StatusView<'a> {
    phase: String,
    scanning: bool,
    progress: Option<f64>,
    scan_id: Option<&'a str>,
    last_scan: Option<&'a ScanDescriptor>,
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ScanArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ScanCommand::Start { range, wait } => {
            let session = Session::open(global, Needs::Push).await?;
            let result = start(&session, range, wait, global).await;
            session.close().await;
            result
        }

        ScanCommand::Cancel => {
            let session = Session::open(global, Needs::Push).await?;
            let result = session.execute(Command::CancelScan).await;
            session.close().await;
            acknowledge(result?, "Scan cancelled", global.quiet);
            Ok(())
        }

        ScanCommand::Check => {
            let session = Session::open(global, Needs::Push).await?;
            let result = session.execute(Command::CheckScanStatus).await;
            session.close().await;
            acknowledge(result?, "Scan status checked", global.quiet);
            Ok(())
        }

        ScanCommand::Status => {
            let session = Session::open(global, Needs::Snapshot).await?;
            let state = session.glacier.state();
            session.close().await;

            let view = StatusView {
                phase: describe_phase(&state.scan),
                scanning: state.scan.is_scanning(),
                progress: state
                    .scan
                    .active()
                    .filter(|a| !a.estimated)
                    .map(|a| a.progress),
                scan_id: state.scan.active().and_then(|a| a.scan_id.as_deref()),
                last_scan: state.topology.last_scan.as_ref(),
            };
            let out = output::render_single(
                global.output,
                &view,
                status_detail,
                |v| v.phase.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

async fn start(
    session: &Session,
    range: Option<String>,
    wait: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = session
        .execute(Command::StartScan { ip_range: range })
        .await?;
    if let CommandResult::ScanStarted { scan_id, job_id } = result {
        let view = StartedView { scan_id, job_id };
        let out = output::render_single(
            global.output,
            &view,
            |v| {
                format!(
                    "Scan started (id: {})",
                    v.scan_id.as_deref().or(v.job_id.as_deref()).unwrap_or("-")
                )
            },
            |v| v.scan_id.clone().unwrap_or_default(),
        )?;
        output::print_output(&out, global.quiet);
    }

    if wait {
        report(follow(session, global.quiet).await?, global.quiet)?;
    }
    Ok(())
}

fn acknowledge(result: CommandResult, fallback: &str, quiet: bool) {
    if quiet {
        return;
    }
    match result {
        CommandResult::Message(message) => eprintln!("✓ {message}"),
        _ => eprintln!("✓ {fallback}"),
    }
}

fn status_detail(view: &StatusView<'_>) -> String {
    let mut lines = vec![format!("Phase:     {}", view.phase)];
    if let Some(id) = view.scan_id {
        lines.push(format!("Scan ID:   {id}"));
    }
    if let Some(last) = view.last_scan {
        lines.push(format!(
            "Last scan: {}",
            last.status.map_or_else(|| "-".into(), |s| s.to_string())
        ));
        if let Some(at) = last.timestamp {
            lines.push(format!("Finished:  {}", super::util::ago(at)));
        }
        lines.push(format!("Found:     {} devices", last.discovered_devices));
        if let Some(ref error) = last.error_message {
            lines.push(format!("Error:     {error}"));
        }
    }
    lines.join("\n")
}
