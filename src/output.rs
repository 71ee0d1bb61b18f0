//! Output formatting
//!
//! Rendering is a pure function of a command result: nothing here talks
//! to the network or reads configuration.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::ghl::error::GhlError;
use crate::resource::{lookup_path, ColumnDef, CommandOutput};

/// Longest cell shown in a table before it is cut
const MAX_CELL_WIDTH: usize = 60;

/// Arrays up to this length are shown inline
const MAX_INLINE_ITEMS: usize = 3;

/// Columns picked automatically when a result has no projection
const MAX_AUTO_COLUMNS: usize = 8;

pub const EMPTY_LIST_MESSAGE: &str = "No results found.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
    /// Identifiers only, one per line
    Quiet,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Quiet => "quiet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "quiet" => Ok(OutputFormat::Quiet),
            other => Err(format!(
                "unknown output format '{other}' (expected table, json, csv or quiet)"
            )),
        }
    }
}

/// Field projection used for table and CSV output
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    /// Columns for lists
    pub columns: &'a [ColumnDef],
    /// Label/value rows for a single record
    pub fields: &'a [ColumnDef],
    pub id_field: &'a str,
}

impl<'a> View<'a> {
    /// A view with no projection: every top-level field is shown
    pub fn raw() -> Self {
        View {
            columns: &[],
            fields: &[],
            id_field: "id",
        }
    }
}

/// Errors are reported the same way in every output format
pub fn render_error(err: &GhlError) -> String {
    format!("Error [{}]: {}", err.kind(), err)
}

pub fn render(output: &CommandOutput, format: OutputFormat, view: &View<'_>) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(output),
        OutputFormat::Quiet => Ok(render_quiet(output, view.id_field)),
        OutputFormat::Csv => render_csv(output, view),
        OutputFormat::Table => Ok(render_table(output, view)),
    }
}

fn render_json(output: &CommandOutput) -> Result<String> {
    let text = match output {
        CommandOutput::Record(value) => serde_json::to_string_pretty(value),
        CommandOutput::Records(values) => serde_json::to_string_pretty(values),
        CommandOutput::Empty => Ok("null".to_string()),
    };
    text.context("serializing JSON output")
}

fn render_quiet(output: &CommandOutput, id_field: &str) -> String {
    let ids: Vec<String> = match output {
        CommandOutput::Record(value) => record_id(value, id_field).into_iter().collect(),
        CommandOutput::Records(values) => values
            .iter()
            .filter_map(|v| record_id(v, id_field))
            .collect(),
        CommandOutput::Empty => Vec::new(),
    };
    ids.join("\n")
}

fn record_id(record: &Value, id_field: &str) -> Option<String> {
    let value = record.get(id_field).or_else(|| record.get("id"))?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn render_csv(output: &CommandOutput, view: &View<'_>) -> Result<String> {
    let (columns, rows): (Vec<ColumnDef>, &[Value]) = match output {
        CommandOutput::Records(values) => (pick_columns(view.columns, values), values.as_slice()),
        CommandOutput::Record(value) => (
            pick_columns(view.fields, std::slice::from_ref(value)),
            std::slice::from_ref(value),
        ),
        CommandOutput::Empty => return Ok(String::new()),
    };
    if rows.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|c| c.header.as_str()))
        .context("Failed to write CSV header")?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| csv_cell(row, &c.json_path)))
            .context("Failed to write CSV row")?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    let text = String::from_utf8(bytes).context("CSV output is not UTF-8")?;
    Ok(text.trim_end().to_string())
}

fn csv_cell(row: &Value, path: &str) -> String {
    match lookup_path(row, path) {
        None | Some(Value::Null) => String::new(),
        Some(value) => format_value(value),
    }
}

fn render_table(output: &CommandOutput, view: &View<'_>) -> String {
    match output {
        CommandOutput::Empty => "Done.".to_string(),
        CommandOutput::Records(values) if values.is_empty() => EMPTY_LIST_MESSAGE.to_string(),
        CommandOutput::Records(values) => {
            let columns = pick_columns(view.columns, values);
            format_table(&columns, values)
        }
        CommandOutput::Record(value @ Value::Object(_)) => {
            let fields = pick_columns(view.fields, std::slice::from_ref(value));
            format_record(&fields, value)
        }
        CommandOutput::Record(other) => format_value(other),
    }
}

/// The projection to show, or the first record's keys when there is none
fn pick_columns(projection: &[ColumnDef], records: &[Value]) -> Vec<ColumnDef> {
    if !projection.is_empty() {
        return projection.to_vec();
    }
    match records.first() {
        Some(Value::Object(map)) => map
            .keys()
            .take(MAX_AUTO_COLUMNS)
            .map(|key| ColumnDef {
                header: key.clone(),
                json_path: key.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn format_table(columns: &[ColumnDef], rows: &[Value]) -> String {
    if columns.is_empty() {
        return rows.iter().map(format_value).collect::<Vec<_>>().join("\n");
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| truncate(&format_value_or_dash(lookup_path(row, &c.json_path))))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.header.chars().count()).collect();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(join_row(columns.iter().map(|c| c.header.as_str()), &widths));
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    lines.push(join_row(rules.iter().map(String::as_str), &widths));
    for row in &cells {
        lines.push(join_row(row.iter().map(String::as_str), &widths));
    }
    lines.join("\n")
}

fn join_row<'s>(cells: impl Iterator<Item = &'s str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

fn format_record(fields: &[ColumnDef], record: &Value) -> String {
    let label_width = fields
        .iter()
        .map(|f| f.header.chars().count())
        .max()
        .unwrap_or(0);
    fields
        .iter()
        .map(|f| {
            let value = format_value_or_dash(lookup_path(record, &f.json_path));
            let pad = label_width - f.header.chars().count();
            format!("{}{}  {}", f.header, " ".repeat(pad), value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    let kept: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
    format!("{kept}...")
}

fn format_value_or_dash(value: Option<&Value>) -> String {
    value.map(format_value).unwrap_or_else(|| "-".to_string())
}

/// Display form of a JSON value in a table cell
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::String(s) => s.replace(['\n', '\r'], " "),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.is_empty() => "-".to_string(),
        Value::Array(items) if items.len() <= MAX_INLINE_ITEMS => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string()),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => format!("{} items", items.len()),
        Value::Object(_) => value.to_string(),
    }
}
