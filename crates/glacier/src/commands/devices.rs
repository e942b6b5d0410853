//! Device command handlers.

use glacier_core::{Command, CommandResult, Device, DeviceKind, DeviceUpdate, MacAddress, NewDevice};

use crate::cli::{DeviceFields, DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::scan;
use super::util::{self, Needs, Session};

// ── Detail view ─────────────────────────────────────────────────────

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("ID:       {}", d.id),
        format!("Label:    {}", d.label),
        format!("Type:     {}", d.kind),
        format!("Status:   {}", output::paint_status(d.status)),
        format!(
            "IP:       {}",
            d.ip.map_or_else(|| "-".into(), |ip| ip.to_string())
        ),
        format!("MAC:      {}", d.mac.as_ref().map_or("-", MacAddress::as_str)),
        format!("Hostname: {}", d.hostname.as_deref().unwrap_or("-")),
    ];
    if let Some(at) = d.last_seen {
        lines.push(format!("Seen:     {}", util::ago(at)));
    }
    if !d.tags.is_empty() {
        lines.push(format!("Tags:     {}", d.tags.join(", ")));
    }
    if d.is_manually_added {
        lines.push("Source:   added manually".into());
    }
    lines.join("\n")
}

fn print_device(device: &Device, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, device, detail, |d| d.id.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn done(message: &str, global: &GlobalOpts) {
    if !global.quiet {
        eprintln!("✓ {message}");
    }
}

// ── Argument assembly ───────────────────────────────────────────────

fn new_device(label: String, fields: DeviceFields) -> Result<NewDevice, CliError> {
    let kind = fields.kind.map_or(DeviceKind::Other, Into::into);
    let mut device = NewDevice::new(label, kind);
    device.ip = fields.ip.as_deref().map(util::parse_ip).transpose()?;
    device.hostname = fields.hostname;
    device.mac = fields.mac.as_deref().map(MacAddress::new);
    device.tags = fields.tags;
    Ok(device)
}

fn device_update(label: Option<String>, fields: DeviceFields) -> Result<DeviceUpdate, CliError> {
    Ok(DeviceUpdate {
        label,
        kind: fields.kind.map(Into::into),
        ip: fields.ip.as_deref().map(util::parse_ip).transpose()?,
        hostname: fields.hostname,
        mac: fields.mac.as_deref().map(MacAddress::new),
        tags: (!fields.tags.is_empty()).then_some(fields.tags),
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let needs = match args.command {
        DevicesCommand::Rescan { .. } => Needs::Push,
        _ => Needs::Snapshot,
    };
    let session = Session::open(global, needs).await?;
    let result = run(&session, args.command, global).await;
    session.close().await;
    result
}

async fn run(session: &Session, cmd: DevicesCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let state = session.glacier.state();
    let lookup = |identifier: &str| util::resolve_device(&state.topology, identifier);

    match cmd {
        DevicesCommand::Get { device } => {
            let id = lookup(&device)?;
            match state.topology.device(&id) {
                Some(d) => print_device(d, global),
                None => Err(CliError::NotFound {
                    resource_type: "device".into(),
                    identifier: device,
                    list_command: "topology show".into(),
                }),
            }
        }

        DevicesCommand::Create {
            label,
            fields,
            from_file,
        } => {
            let new = match (from_file, label) {
                (Some(path), _) => util::read_json_file::<NewDevice>(&path)?,
                (None, Some(label)) => new_device(label, fields)?,
                (None, None) => {
                    return Err(CliError::Validation {
                        field: "label".into(),
                        reason: "a label or --from-file is required".into(),
                    });
                }
            };
            if let CommandResult::Device(device) =
                session.execute(Command::CreateDevice(new)).await?
            {
                print_device(&device, global)?;
            }
            Ok(())
        }

        DevicesCommand::Edit {
            device,
            label,
            fields,
            from_file,
        } => {
            let id = lookup(&device)?;
            let update = match from_file {
                Some(path) => util::read_json_file::<DeviceUpdate>(&path)?,
                None => device_update(label, fields)?,
            };
            if let CommandResult::Device(device) =
                session.execute(Command::UpdateDevice { id, update }).await?
            {
                print_device(&device, global)?;
            }
            Ok(())
        }

        DevicesCommand::Toggle { device } => {
            let id = lookup(&device)?;
            if let CommandResult::Device(device) =
                session.execute(Command::ToggleStatus { id }).await?
            {
                done(&format!("{} is now {}", device.label, device.status), global);
            }
            Ok(())
        }

        DevicesCommand::Status { device, status } => {
            let id = lookup(&device)?;
            let status = status.into();
            session.execute(Command::SetStatus { id, status }).await?;
            done(&format!("{device} set to {status}"), global);
            Ok(())
        }

        DevicesCommand::Remove { device } => {
            let id = lookup(&device)?;
            let label = state
                .topology
                .device(&id)
                .map_or_else(|| id.to_string(), |d| d.label.clone());
            if !util::confirm(
                &format!("Remove {label} and its connections?"),
                global.yes,
                "devices remove",
            )? {
                return Ok(());
            }
            session.execute(Command::RemoveDevice { id }).await?;
            done(&format!("Removed {label}"), global);
            Ok(())
        }

        DevicesCommand::Rescan { device, wait } => {
            let id = lookup(&device)?;
            let result = session.execute(Command::RescanDevice { id }).await?;
            if let CommandResult::ScanStarted { scan_id, .. } = result {
                done(
                    &format!("Rescan started (id: {})", scan_id.as_deref().unwrap_or("-")),
                    global,
                );
            }
            if wait {
                scan::report(scan::follow(session, global.quiet).await?, global.quiet)?;
            }
            Ok(())
        }

        DevicesCommand::Ignore { device } => {
            let id = lookup(&device)?;
            session.execute(Command::IgnoreDevice { id }).await?;
            done(&format!("Ignoring {device}"), global);
            Ok(())
        }

        // Ignored devices are absent from snapshots, so take the id as given.
        DevicesCommand::Unignore { device } => {
            let id = glacier_core::EntityId::from(device.as_str());
            session.execute(Command::UnignoreDevice { id }).await?;
            done(&format!("{device} is visible again"), global);
            Ok(())
        }
    }
}
