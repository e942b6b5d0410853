// ── Scan lifecycle ──
//
// Pure state machine for discovery scans. Every input returns the
// effects the caller must carry out (refetch, notice, error); the
// machine itself performs no I/O.
//
//   Loading ──snapshot──▶ Idle | Scanning | StaleDetected
//   Idle ──start / active snapshot / progress──▶ Scanning
//   Scanning ──progress──▶ Scanning (monotonic)
//   Scanning ──100 / is_complete──▶ Idle(Completed) + refetch
//   Scanning ──error / failed / timed_out──▶ Idle(Failed) + error
//   Scanning ──cancelled──▶ Idle(Cancelled) + notice
//   Scanning ──inactive snapshot──▶ Idle(outcome of lastScan)
//   * ──stale snapshot──▶ StaleDetected + one advisory

use std::collections::HashSet;

use glacier_api::ScanProgress;

use crate::model::{ScanDescriptor, ScanStatus, Topology};

/// Progress shown for a scan adopted from a snapshot, where the real
/// value cannot be recovered.
pub const ADOPTED_PROGRESS_ESTIMATE: f64 = 50.0;

const STALE_ADVISORY: &str =
    "A previous scan was interrupted and is no longer running. Start a new scan to refresh the topology.";

/// A scan being tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveScan {
    pub scan_id: Option<String>,
    pub job_id: Option<String>,
    /// 0–100.
    pub progress: f64,
    /// `progress` is a placeholder, not a server-reported value.
    pub estimated: bool,
    pub discovered_devices: Option<u32>,
    pub message: Option<String>,
}

impl ActiveScan {
    fn started(scan_id: Option<String>, job_id: Option<String>) -> Self {
        Self {
            scan_id,
            job_id,
            progress: 0.0,
            estimated: false,
            discovered_devices: None,
            message: None,
        }
    }

    fn adopted(scan_id: Option<String>) -> Self {
        Self {
            progress: ADOPTED_PROGRESS_ESTIMATE,
            estimated: true,
            ..Self::started(scan_id, None)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Completed { discovered_devices: Option<u32> },
    Failed { message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanPhase {
    /// Before the first snapshot has been processed.
    Loading,
    Idle { outcome: Option<ScanOutcome> },
    Scanning(ActiveScan),
    /// The server reports a scan in progress that was interrupted by a
    /// restart. No progress is shown.
    StaleDetected,
}

impl ScanPhase {
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning(_))
    }

    pub fn active(&self) -> Option<&ActiveScan> {
        match self {
            Self::Scanning(active) => Some(active),
            _ => None,
        }
    }
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEffect {
    RefetchTopology,
    Notice(String),
    Error(String),
}

/// The scan state machine.
#[derive(Debug)]
pub struct ScanLifecycle {
    phase: ScanPhase,
    /// Scan ids that already reached a terminal state; late or repeated
    /// progress for them is ignored.
    finished: HashSet<String>,
}

impl Default for ScanLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanLifecycle {
    pub fn new() -> Self {
        Self {
            phase: ScanPhase::Loading,
            finished: HashSet::new(),
        }
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.phase
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// A full snapshot was applied.
    pub fn on_snapshot(&mut self, topology: &Topology) -> Vec<ScanEffect> {
        let last = topology.last_scan.as_ref();

        if topology.active_scan_in_progress {
            if last.is_some_and(|s| s.is_stale) {
                if self.phase == ScanPhase::StaleDetected {
                    return Vec::new();
                }
                tracing::info!("snapshot reports an interrupted scan");
                self.phase = ScanPhase::StaleDetected;
                return vec![ScanEffect::Error(STALE_ADVISORY.to_owned())];
            }
            // `lastScan` names the latest finished scan, not the running one;
            // the id arrives with the first progress event.
            if !self.phase.is_scanning() {
                tracing::debug!("adopting in-progress scan from snapshot");
                self.phase = ScanPhase::Scanning(ActiveScan::adopted(None));
            }
            return Vec::new();
        }

        match &self.phase {
            ScanPhase::Loading | ScanPhase::StaleDetected => {
                self.phase = ScanPhase::Idle { outcome: None };
            }
            ScanPhase::Scanning(active) => {
                // The server no longer runs a scan; progress for its end was missed.
                if let Some(ref id) = active.scan_id {
                    self.finished.insert(id.clone());
                }
                let outcome = snapshot_outcome(active, last);
                tracing::debug!(?outcome, "snapshot ended the tracked scan");
                self.phase = ScanPhase::Idle {
                    outcome: Some(outcome),
                };
            }
            ScanPhase::Idle { .. } => {}
        }
        Vec::new()
    }

    /// The first fetch failed; there is nothing to wait for.
    pub fn on_fetch_failed(&mut self) {
        if self.phase == ScanPhase::Loading {
            self.phase = ScanPhase::Idle { outcome: None };
        }
    }

    /// A `scan_progress` push event arrived.
    pub fn on_progress(&mut self, update: &ScanProgress) -> Vec<ScanEffect> {
        if let Some(ref id) = update.scan_id {
            if self.finished.contains(id) {
                tracing::trace!(scan_id = %id, "progress for finished scan ignored");
                return Vec::new();
            }
        }

        let status = update.status.as_deref().map(str::to_ascii_lowercase);
        let status = status.as_deref();

        let failure = match status {
            Some("failed") => Some(("Scan failed", "the scanner reported a failure")),
            Some("timed_out" | "timed-out" | "timeout") => Some(("Scan timed out", "timed out")),
            _ => None,
        };
        let error = update
            .error
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| (format!("Scan failed: {e}"), e))
            .or_else(|| failure.map(|(text, message)| (text.to_owned(), message)));
        if let Some((text, message)) = error {
            self.finish(update.scan_id.as_ref());
            tracing::warn!(error = %message, status = ?update.status, "scan did not complete");
            self.phase = ScanPhase::Idle {
                outcome: Some(ScanOutcome::Failed {
                    message: message.to_owned(),
                }),
            };
            return vec![ScanEffect::Error(text)];
        }

        if matches!(status, Some("cancelled" | "canceled")) {
            if update.scan_id.is_none() && !self.phase.is_scanning() {
                return Vec::new();
            }
            self.finish(update.scan_id.as_ref());
            tracing::info!(scan_id = ?update.scan_id, "scan cancelled");
            return self.on_cancelled(None);
        }

        let progress = clamp_progress(update.progress);

        if update.is_complete == Some(true) || progress >= 100.0 {
            if update.scan_id.is_none() && !self.phase.is_scanning() {
                return Vec::new();
            }
            self.finish(update.scan_id.as_ref());
            let discovered = update
                .discovered_devices
                .or_else(|| self.phase.active().and_then(|a| a.discovered_devices));
            self.phase = ScanPhase::Idle {
                outcome: Some(ScanOutcome::Completed {
                    discovered_devices: discovered,
                }),
            };
            let notice = match discovered {
                Some(n) => format!("Scan complete: {n} devices discovered"),
                None => "Scan complete".to_owned(),
            };
            return vec![ScanEffect::RefetchTopology, ScanEffect::Notice(notice)];
        }

        match &mut self.phase {
            ScanPhase::Scanning(active)
                if update.scan_id.is_none()
                    || active.scan_id.is_none()
                    || active.scan_id == update.scan_id =>
            {
                active.progress = if active.estimated {
                    progress
                } else {
                    active.progress.max(progress)
                };
                active.estimated = false;
                if update.scan_id.is_some() {
                    active.scan_id.clone_from(&update.scan_id);
                }
                if update.job_id.is_some() {
                    active.job_id.clone_from(&update.job_id);
                }
                if update.discovered_devices.is_some() {
                    active.discovered_devices = update.discovered_devices;
                }
                if update.message.is_some() {
                    active.message.clone_from(&update.message);
                }
            }
            _ => {
                tracing::debug!(scan_id = ?update.scan_id, progress, "tracking scan from progress event");
                self.phase = ScanPhase::Scanning(ActiveScan {
                    progress,
                    discovered_devices: update.discovered_devices,
                    message: update.message.clone(),
                    ..ActiveScan::started(update.scan_id.clone(), update.job_id.clone())
                });
            }
        }
        Vec::new()
    }

    /// The server acknowledged a scan start.
    pub fn on_started(
        &mut self,
        scan_id: Option<String>,
        job_id: Option<String>,
        message: Option<String>,
    ) -> Vec<ScanEffect> {
        self.phase = ScanPhase::Scanning(ActiveScan::started(scan_id, job_id));
        vec![ScanEffect::Notice(
            message.unwrap_or_else(|| "Network scan started".into()),
        )]
    }

    /// The server acknowledged a cancel.
    pub fn on_cancelled(&mut self, message: Option<String>) -> Vec<ScanEffect> {
        if let ScanPhase::Scanning(ref active) = self.phase {
            if let Some(id) = active.scan_id.clone() {
                self.finished.insert(id);
            }
        }
        self.phase = ScanPhase::Idle {
            outcome: Some(ScanOutcome::Cancelled),
        };
        vec![ScanEffect::Notice(
            message.unwrap_or_else(|| "Scan cancelled".into()),
        )]
    }

    /// The server cleaned up stale scans.
    pub fn on_stale_cleared(&mut self, message: Option<String>) -> Vec<ScanEffect> {
        if self.phase == ScanPhase::StaleDetected {
            self.phase = ScanPhase::Idle { outcome: None };
        }
        let mut effects = vec![ScanEffect::RefetchTopology];
        if let Some(message) = message {
            effects.push(ScanEffect::Notice(message));
        }
        effects
    }

    fn finish(&mut self, scan_id: Option<&String>) {
        if let Some(id) = scan_id {
            self.finished.insert(id.clone());
        }
    }
}

/// Outcome of a tracked scan the server reports as no longer running.
///
/// `lastScan` describes it only when the ids agree or ours is unknown.
fn snapshot_outcome(active: &ActiveScan, last: Option<&ScanDescriptor>) -> ScanOutcome {
    let last = last.filter(|s| match (&active.scan_id, &s.id) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => true,
    });
    match last {
        Some(s) if s.status == Some(ScanStatus::Failed) || s.error_message.is_some() => {
            ScanOutcome::Failed {
                message: s
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "scan failed".into()),
            }
        }
        Some(s) if s.is_finished() || s.status.is_none() => ScanOutcome::Completed {
            discovered_devices: Some(s.discovered_devices),
        },
        _ => ScanOutcome::Completed {
            discovered_devices: active.discovered_devices,
        },
    }
}

fn clamp_progress(raw: f64) -> f64 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn progress(value: f64, scan_id: &str) -> ScanProgress {
        ScanProgress {
            progress: value,
            scan_id: Some(scan_id.into()),
            ..ScanProgress::default()
        }
    }

    fn snapshot(active: bool, stale: bool) -> Topology {
        Topology {
            active_scan_in_progress: active,
            last_scan: Some(ScanDescriptor {
                id: Some("s1".into()),
                is_stale: stale,
                ..ScanDescriptor::default()
            }),
            ..Topology::default()
        }
    }

    fn finished_snapshot(id: &str, status: ScanStatus, discovered: u32) -> Topology {
        Topology {
            last_scan: Some(ScanDescriptor {
                id: Some(id.into()),
                status: Some(status),
                discovered_devices: discovered,
                ..ScanDescriptor::default()
            }),
            ..Topology::default()
        }
    }

    /// The server's last frame for a scan that did not complete.
    fn final_frame(status: &str) -> ScanProgress {
        ScanProgress {
            progress: 100.0,
            status: Some(status.into()),
            is_complete: Some(true),
            job_id: Some("j".into()),
            discovered_devices: Some(0),
            ..progress(100.0, "x")
        }
    }

    #[test]
    fn starts_in_loading() {
        assert_eq!(ScanLifecycle::new().phase(), &ScanPhase::Loading);
    }

    #[test]
    fn quiet_snapshot_resolves_loading_to_idle() {
        let mut scan = ScanLifecycle::new();
        assert!(scan.on_snapshot(&Topology::default()).is_empty());
        assert_eq!(scan.phase(), &ScanPhase::Idle { outcome: None });
    }

    #[test]
    fn active_snapshot_adopts_midpoint_estimate() {
        let mut scan = ScanLifecycle::new();
        scan.on_snapshot(&snapshot(true, false));

        let active = scan.phase().active().unwrap();
        assert!((active.progress - ADOPTED_PROGRESS_ESTIMATE).abs() < f64::EPSILON);
        assert!(active.estimated);
        assert_eq!(active.scan_id, None, "lastScan is the previous finished scan");
    }

    #[test]
    fn stale_snapshot_advises_exactly_once() {
        let mut scan = ScanLifecycle::new();
        let first = scan.on_snapshot(&snapshot(true, true));
        let second = scan.on_snapshot(&snapshot(true, true));

        assert_eq!(first.len(), 1);
        assert!(matches!(first[0], ScanEffect::Error(_)));
        assert!(second.is_empty());
        assert_eq!(scan.phase(), &ScanPhase::StaleDetected);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), None, None);
        scan.on_progress(&progress(40.0, "x"));
        scan.on_progress(&progress(30.0, "x"));

        assert!((scan.phase().active().unwrap().progress - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn real_progress_replaces_estimate() {
        let mut scan = ScanLifecycle::new();
        scan.on_snapshot(&snapshot(true, false));
        scan.on_progress(&progress(20.0, "s1"));

        let active = scan.phase().active().unwrap();
        assert!((active.progress - 20.0).abs() < f64::EPSILON);
        assert!(!active.estimated);
    }

    #[test]
    fn completion_refetches_exactly_once() {
        let mut scan = ScanLifecycle::new();
        scan.on_snapshot(&Topology::default());

        let first = scan.on_progress(&progress(100.0, "x"));
        let repeat = scan.on_progress(&progress(100.0, "x"));

        assert_eq!(
            first.iter().filter(|e| **e == ScanEffect::RefetchTopology).count(),
            1
        );
        assert!(repeat.is_empty());
        assert!(matches!(
            scan.phase(),
            ScanPhase::Idle {
                outcome: Some(ScanOutcome::Completed { .. })
            }
        ));
    }

    #[test]
    fn is_complete_counts_as_done() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), None, None);
        let effects = scan.on_progress(&ScanProgress {
            progress: 90.0,
            is_complete: Some(true),
            discovered_devices: Some(7),
            ..progress(0.0, "x")
        });

        assert!(effects.contains(&ScanEffect::RefetchTopology));
        assert!(effects.contains(&ScanEffect::Notice("Scan complete: 7 devices discovered".into())));
    }

    #[test]
    fn error_returns_to_idle_and_surfaces() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), None, None);
        let effects = scan.on_progress(&ScanProgress {
            error: Some("nmap missing".into()),
            ..progress(10.0, "x")
        });

        assert_eq!(effects, vec![ScanEffect::Error("Scan failed: nmap missing".into())]);
        assert!(!scan.phase().is_scanning());
        assert!(scan.on_progress(&progress(100.0, "x")).is_empty(), "late completion ignored");
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), Some("job".into()), None);
        scan.on_cancelled(None);

        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Cancelled)
            }
        );
        assert!(scan.on_progress(&progress(60.0, "x")).is_empty());
    }

    #[test]
    fn stale_cleared_refetches() {
        let mut scan = ScanLifecycle::new();
        scan.on_snapshot(&snapshot(true, true));
        let effects = scan.on_stale_cleared(Some("Cleaned 1 stale scan".into()));

        assert_eq!(effects[0], ScanEffect::RefetchTopology);
        assert_eq!(scan.phase(), &ScanPhase::Idle { outcome: None });
    }

    #[test]
    fn finished_snapshot_ends_missed_scan() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("s1".into()), None, None);
        let mut topology = snapshot(false, false);
        if let Some(ref mut last) = topology.last_scan {
            last.status = Some(crate::model::ScanStatus::Completed);
            last.discovered_devices = 3;
        }
        scan.on_snapshot(&topology);

        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Completed {
                    discovered_devices: Some(3)
                })
            }
        );
    }

    #[test]
    fn failed_final_frame_surfaces_error() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), Some("j".into()), None);
        let effects = scan.on_progress(&final_frame("FAILED"));

        assert_eq!(effects, vec![ScanEffect::Error("Scan failed".into())]);
        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Failed {
                    message: "the scanner reported a failure".into()
                })
            }
        );
    }

    #[test]
    fn timed_out_final_frame_is_a_failure() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), None, None);
        let effects = scan.on_progress(&final_frame("TIMED_OUT"));

        assert_eq!(effects, vec![ScanEffect::Error("Scan timed out".into())]);
        assert!(!effects.contains(&ScanEffect::RefetchTopology));
        assert!(matches!(
            scan.phase(),
            ScanPhase::Idle {
                outcome: Some(ScanOutcome::Failed { .. })
            }
        ));
    }

    #[test]
    fn cancelled_final_frame_is_a_cancel() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("x".into()), None, None);
        let effects = scan.on_progress(&final_frame("CANCELLED"));

        assert_eq!(effects, vec![ScanEffect::Notice("Scan cancelled".into())]);
        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Cancelled)
            }
        );
        assert!(scan.on_progress(&progress(100.0, "x")).is_empty());
    }

    #[test]
    fn inactive_snapshot_ends_adopted_scan() {
        let mut scan = ScanLifecycle::new();
        scan.on_snapshot(&snapshot(true, false));
        scan.on_snapshot(&snapshot(false, false));

        assert!(!scan.phase().is_scanning());
        assert!(matches!(
            scan.phase(),
            ScanPhase::Idle {
                outcome: Some(ScanOutcome::Completed { .. })
            }
        ));
    }

    #[test]
    fn newer_last_scan_ends_adopted_scan() {
        let mut scan = ScanLifecycle::new();
        let mut running = finished_snapshot("old", ScanStatus::Completed, 2);
        running.active_scan_in_progress = true;
        scan.on_snapshot(&running);
        assert!(scan.phase().is_scanning());

        scan.on_snapshot(&finished_snapshot("new", ScanStatus::Completed, 5));

        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Completed {
                    discovered_devices: Some(5)
                })
            }
        );
    }

    #[test]
    fn inactive_snapshot_reports_failed_last_scan() {
        let mut scan = ScanLifecycle::new();
        scan.on_started(Some("s1".into()), None, None);
        let mut topology = finished_snapshot("s1", ScanStatus::Failed, 0);
        if let Some(ref mut last) = topology.last_scan {
            last.error_message = Some("nmap missing".into());
        }
        scan.on_snapshot(&topology);

        assert_eq!(
            scan.phase(),
            &ScanPhase::Idle {
                outcome: Some(ScanOutcome::Failed {
                    message: "nmap missing".into()
                })
            }
        );
        assert!(scan.on_progress(&progress(40.0, "s1")).is_empty(), "late progress ignored");
    }
}
