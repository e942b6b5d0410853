//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use glacier_core::{ConnectionStatus, DeviceStatus};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

static COLOR: AtomicBool = AtomicBool::new(false);

/// Resolve `--color` once at startup.
pub fn init_color(mode: ColorMode) {
    let enabled = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    };
    COLOR.store(enabled, Ordering::Relaxed);
}

pub fn color_enabled() -> bool {
    COLOR.load(Ordering::Relaxed)
}

pub fn paint_status(status: DeviceStatus) -> String {
    let text = status.to_string();
    if !color_enabled() {
        return text;
    }
    match status {
        DeviceStatus::Online => text.green().to_string(),
        DeviceStatus::Offline => text.dimmed().to_string(),
        DeviceStatus::Warning => text.yellow().to_string(),
        DeviceStatus::Error => text.red().to_string(),
    }
}

pub fn paint_link(status: ConnectionStatus) -> String {
    let text = status.to_string();
    if !color_enabled() {
        return text;
    }
    match status {
        ConnectionStatus::Active => text.green().to_string(),
        ConnectionStatus::Inactive => text.dimmed().to_string(),
        ConnectionStatus::Warning => text.yellow().to_string(),
        ConnectionStatus::Error => text.red().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: builds rows with `to_row` and renders a rounded table
/// - `json` / `json-compact` / `yaml`: serializes the original data
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single item. Table output uses `detail_fn` since detail
/// views are key/value blocks rather than rows.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    serde_yaml::to_string(data).map_err(|e| CliError::Internal(format!("YAML output: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Item {
        id: &'static str,
        n: u32,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: &'static str,
    }

    fn items() -> Vec<Item> {
        vec![Item { id: "a", n: 1 }, Item { id: "b", n: 2 }]
    }

    #[test]
    fn plain_lists_one_id_per_line() {
        let out = render_list(OutputFormat::Plain, &items(), |i| Row { id: i.id }, |i| i.id.into()).unwrap();
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out =
            render_list(OutputFormat::JsonCompact, &items(), |i| Row { id: i.id }, |i| i.id.into()).unwrap();
        assert_eq!(out, r#"[{"id":"a","n":1},{"id":"b","n":2}]"#);
    }

    #[test]
    fn table_has_header_and_rows() {
        let out = render_list(OutputFormat::Table, &items(), |i| Row { id: i.id }, |i| i.id.into()).unwrap();
        assert!(out.contains("ID"));
        assert!(out.contains('a') && out.contains('b'));
    }

    #[test]
    fn yaml_renders_fields() {
        let out = render_single(OutputFormat::Yaml, &Item { id: "a", n: 7 }, |_| String::new(), |i| i.id.into())
            .unwrap();
        assert!(out.contains("id: a"));
        assert!(out.contains("n: 7"));
    }
}
