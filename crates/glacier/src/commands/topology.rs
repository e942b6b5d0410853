//! Topology command handlers: laid-out device table, connections, live watch.

use std::sync::Arc;
use std::time::Duration;

use tabled::Tabled;

use glacier_core::{
    Connection, Device, EntityId, GlacierState, LayoutConfig, LayoutEngine, PushState, Topology,
    ViewFilter, visible_devices,
};

use crate::cli::{FilterArgs, GlobalOpts, TopologyArgs, TopologyCommand};
use crate::error::CliError;
use crate::output;

use super::scan::{ScanProgress, describe_phase};
use super::util::{self, Needs, Session};

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Rank")]
    rank: String,
    #[tabled(rename = "X")]
    x: String,
    #[tabled(rename = "Y")]
    y: String,
}

impl DeviceRow {
    fn new(d: &Device, layout: &LayoutConfig) -> Self {
        let (rank, x, y) = d.position.map_or_else(
            || ("-".into(), "-".into(), "-".into()),
            |p| {
                (
                    rank_of(p.y, layout).to_string(),
                    format!("{:.0}", p.x),
                    format!("{:.0}", p.y),
                )
            },
        );
        Self {
            id: d.id.to_string(),
            label: d.label.clone(),
            kind: d.kind.to_string(),
            status: output::paint_status(d.status),
            ip: d.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            rank,
            x,
            y,
        }
    }
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Label")]
    label: String,
}

impl ConnectionRow {
    fn new(c: &Connection, topology: &Topology) -> Self {
        let name = |id: &EntityId| {
            topology
                .device(id)
                .map_or_else(|| id.to_string(), |d| d.label.clone())
        };
        Self {
            source: name(&c.source),
            target: name(&c.target),
            status: output::paint_link(c.status),
            kind: c.kind.map(|k| k.to_string()).unwrap_or_default(),
            label: c.label.clone().unwrap_or_default(),
        }
    }
}

/// Layer index recovered from a layered y coordinate.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn rank_of(y: f64, layout: &LayoutConfig) -> i64 {
    let pitch = layout.node_height + layout.rank_spacing;
    if pitch <= 0.0 {
        return 0;
    }
    ((y - layout.node_height / 2.0) / pitch).round() as i64
}

impl From<&FilterArgs> for ViewFilter {
    fn from(args: &FilterArgs) -> Self {
        Self {
            search: args.search.clone(),
            status: args.status.map(Into::into),
            kind: args.kind.map(Into::into),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: TopologyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TopologyCommand::Show(filter) => {
            let session = Session::open(global, Needs::Snapshot).await?;
            let result = show(&session, &filter, global);
            session.close().await;
            result
        }

        TopologyCommand::Connections => {
            let session = Session::open(global, Needs::Snapshot).await?;
            let state = session.glacier.state();
            session.close().await;

            let topology = &state.topology;
            let links: Vec<&Connection> = topology.visible_connections().collect();
            let out = output::render_list(
                global.output,
                &links,
                |c| ConnectionRow::new(c, topology),
                |c| format!("{} {}", c.source, c.target),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TopologyCommand::Watch { duration } => {
            let session = Session::open(global, Needs::Live).await?;
            let result = watch(&session, duration, global.quiet).await;
            session.close().await;
            result
        }
    }
}

fn show(session: &Session, filter: &FilterArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let state = session.glacier.state();
    let layout = session.glacier.config().layout;
    let topology = LayoutEngine::layered(layout).apply(&state.topology);

    let devices = visible_devices(&topology, &ViewFilter::from(filter));
    let out = output::render_list(
        global.output,
        &devices,
        |d| DeviceRow::new(d, &layout),
        |d| d.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    if !global.quiet && global.output == crate::cli::OutputFormat::Table {
        eprintln!("{}", summary(&state, devices.len()));
        if let Some(ref advisory) = state.error {
            eprintln!("! {advisory}");
        }
    }
    Ok(())
}

fn summary(state: &GlacierState, shown: usize) -> String {
    let topology = &state.topology;
    let mut line = format!(
        "{shown} of {} devices, {} connections, scan: {}",
        topology.devices.len(),
        topology.visible_connections().count(),
        describe_phase(&state.scan),
    );
    if let Some(at) = topology.last_scan.as_ref().and_then(|s| s.timestamp) {
        line.push_str(&format!(", last scan {}", util::ago(at)));
    }
    line
}

// ── Watch ───────────────────────────────────────────────────────────

async fn watch(session: &Session, duration: Option<Duration>, quiet: bool) -> Result<(), CliError> {
    let mut stream = session.glacier.subscribe();
    let mut previous = stream.current().clone();
    let mut progress = ScanProgress::new(quiet);
    progress.update(&previous.scan);

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    if !quiet {
        eprintln!(
            "Watching {} devices (Ctrl-C to stop)",
            previous.topology.devices.len()
        );
    }

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            next = stream.changed() => {
                let Some(state) = next else { break };
                progress.update(&state.scan);
                if !quiet {
                    for line in diff(&previous, &state) {
                        progress.println(&line);
                    }
                }
                previous = state;
            }
        }
    }

    progress.finish();
    Ok(())
}

/// Human-readable changes between two observed states.
fn diff(before: &Arc<GlacierState>, after: &Arc<GlacierState>) -> Vec<String> {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    let mut lines = Vec::new();

    if before.push != after.push {
        lines.push(format!("{stamp} push {}", push_label(after.push)));
    }

    if !Arc::ptr_eq(&before.topology, &after.topology) {
        let (old, new) = (&before.topology, &after.topology);
        for device in new.devices.values() {
            match old.device(&device.id) {
                None => lines.push(format!("{stamp} + {} ({})", device.label, device.id)),
                Some(prev) if prev.status != device.status => lines.push(format!(
                    "{stamp} ~ {} {} -> {}",
                    device.label,
                    prev.status,
                    output::paint_status(device.status)
                )),
                Some(_) => {}
            }
        }
        for device in old.devices.values() {
            if new.device(&device.id).is_none() {
                lines.push(format!("{stamp} - {} ({})", device.label, device.id));
            }
        }
        let (was, now) = (
            old.visible_connections().count(),
            new.visible_connections().count(),
        );
        if was != now {
            lines.push(format!("{stamp} connections {was} -> {now}"));
        }
    }

    if after.notice != before.notice {
        if let Some(ref notice) = after.notice {
            lines.push(format!("{stamp} {notice}"));
        }
    }
    if after.error != before.error {
        if let Some(ref error) = after.error {
            lines.push(format!("{stamp} ! {error}"));
        }
    }
    lines
}

fn push_label(state: PushState) -> String {
    match state {
        PushState::Connecting => "connecting".into(),
        PushState::Connected => "connected".into(),
        PushState::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
        PushState::Disconnected => "disconnected".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use glacier_core::{DeviceKind, DeviceStatus, Position};

    fn device(id: &str, status: DeviceStatus) -> Device {
        Device {
            id: id.into(),
            label: format!("dev-{id}"),
            kind: DeviceKind::Router,
            ip: None,
            mac: None,
            hostname: None,
            last_seen: None,
            status,
            tags: Vec::new(),
            metadata: None,
            is_ignored: false,
            is_manually_added: false,
            position: None,
        }
    }

    fn state(devices: Vec<Device>) -> Arc<GlacierState> {
        Arc::new(GlacierState {
            topology: Arc::new(Topology::from_parts(devices, Vec::new())),
            ..GlacierState::default()
        })
    }

    #[test]
    fn rank_inverts_layered_y() {
        let layout = LayoutConfig::default();
        let pitch = layout.node_height + layout.rank_spacing;
        assert_eq!(rank_of(layout.node_height / 2.0, &layout), 0);
        assert_eq!(rank_of(2.0 * pitch + layout.node_height / 2.0, &layout), 2);
    }

    #[test]
    fn row_without_position_shows_dashes() {
        let row = DeviceRow::new(&device("a", DeviceStatus::Online), &LayoutConfig::default());
        assert_eq!((row.rank.as_str(), row.x.as_str()), ("-", "-"));

        let mut placed = device("b", DeviceStatus::Online);
        placed.position = Some(Position::new(86.0, 18.0));
        let row = DeviceRow::new(&placed, &LayoutConfig::default());
        assert_eq!((row.rank.as_str(), row.x.as_str(), row.y.as_str()), ("0", "86", "18"));
    }

    #[test]
    fn diff_reports_added_removed_and_status() {
        let before = state(vec![device("a", DeviceStatus::Online), device("b", DeviceStatus::Online)]);
        let after = state(vec![device("a", DeviceStatus::Offline), device("c", DeviceStatus::Online)]);

        let lines = diff(&before, &after);
        assert_eq!(lines.len(), 3, "{lines:?}");
        assert!(lines[0].ends_with("~ dev-a online -> offline"));
        assert!(lines[1].ends_with("+ dev-c (c)"));
        assert!(lines[2].ends_with("- dev-b (b)"));
    }

    #[test]
    fn diff_is_empty_for_identical_states() {
        let s = state(vec![device("a", DeviceStatus::Online)]);
        assert!(diff(&s, &s).is_empty());
    }
}
