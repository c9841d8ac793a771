use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::OutputError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Rows to show in table form, with the column order fixed up front.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, Value>>,
    pub footer: Option<String>,
}

impl TableView {
    /// Projects serializable items onto `columns`; missing fields render as `-`.
    pub fn from_items<T: Serialize>(
        items: &[T],
        columns: &[&str],
    ) -> Result<Self, OutputError> {
        let rows = items
            .iter()
            .map(|item| match serde_json::to_value(item) {
                Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
                Ok(other) => Ok(BTreeMap::from([("value".to_string(), other)])),
                Err(error) => Err(OutputError::JsonSerialize(error.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows,
            footer: None,
        })
    }

    pub fn with_footer(
        mut self,
        footer: impl Into<String>,
    ) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

pub fn render<T: Serialize>(
    payload: &T,
    table: &TableView,
    format: OutputFormat,
) -> Result<String, OutputError> {
    match format {
        OutputFormat::Table => Ok(render_table(table)),
        OutputFormat::Json => render_json(payload),
        OutputFormat::Yaml => render_yaml(payload),
    }
}

pub fn render_json<T: Serialize>(payload: &T) -> Result<String, OutputError> {
    serde_json::to_string_pretty(payload)
        .map_err(|error| OutputError::JsonSerialize(error.to_string()))
}

pub fn render_yaml<T: Serialize>(payload: &T) -> Result<String, OutputError> {
    serde_yaml::to_string(payload).map_err(|error| OutputError::YamlSerialize(error.to_string()))
}

pub fn render_table(table: &TableView) -> String {
    let footer = table
        .footer
        .clone()
        .unwrap_or_else(|| format!("rows: {}", table.rows.len()));
    if table.columns.is_empty() {
        return footer;
    }

    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            table
                .columns
                .iter()
                .map(|column| {
                    row.get(column)
                        .map(value_to_cell)
                        .unwrap_or_else(|| "-".to_string())
                })
                .collect()
        })
        .collect();

    let widths = compute_widths(&table.columns, &cells);
    let mut lines = Vec::with_capacity(cells.len() + 3);
    lines.push(format_row(&table.columns, &widths));
    lines.push(format_separator(&widths));
    for row in &cells {
        lines.push(format_row(row, &widths));
    }
    lines.push(footer);
    lines.join("\n")
}

fn compute_widths(
    columns: &[String],
    cells: &[Vec<String>],
) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].chars().count())
                .fold(column.chars().count(), usize::max)
        })
        .collect()
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "-".to_string(),
        Value::Number(number) if number.is_f64() => number
            .as_f64()
            .map(|float| {
                if float.fract() == 0.0 {
                    format!("{float:.0}")
                } else {
                    format!("{float:.2}")
                }
            })
            .unwrap_or_else(|| number.to_string()),
        _ => value.to_string(),
    }
}

fn format_row(
    cells: &[String],
    widths: &[usize],
) -> String {
    let mut out = String::new();
    out.push('|');
    for (index, cell) in cells.iter().enumerate() {
        out.push(' ');
        out.push_str(cell);
        let padding = widths[index].saturating_sub(cell.chars().count());
        out.extend(std::iter::repeat_n(' ', padding));
        out.push_str(" |");
    }
    out
}

fn format_separator(widths: &[usize]) -> String {
    let mut out = String::new();
    out.push('|');
    for width in widths {
        out.push(' ');
        out.extend(std::iter::repeat_n('-', *width));
        out.push_str(" |");
    }
    out
}
