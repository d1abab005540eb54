//! Result rendering: JSON documents or a fixed-column table.

use std::io::Write;

use serde::Serialize;

use quotesync_core::StockQuote;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// One printed row per quote, mirroring the object's display columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRow {
    pub namespace: String,
    pub name: String,
    pub ticker: String,
    pub price: Option<String>,
    pub last_updated: Option<String>,
    pub next_update_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuoteRow {
    pub fn from_object(object: &StockQuote) -> Self {
        Self {
            namespace: object.metadata.namespace.clone(),
            name: object.metadata.name.clone(),
            ticker: object.spec.ticker.to_string(),
            price: object.status.price.clone(),
            last_updated: object.status.last_updated.map(|at| at.to_string()),
            next_update_time: object.status.next_update_time.map(|at| at.to_string()),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub fn render_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

pub fn render_rows(rows: &[QuoteRow], format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => render_json(&rows, pretty),
        OutputFormat::Table => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(table(rows).as_bytes())?;
            Ok(())
        }
    }
}

fn table(rows: &[QuoteRow]) -> String {
    const HEADERS: [&str; 5] = ["NAMESPACE", "NAME", "TICKER", "PRICE", "LAST UPDATED"];

    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.namespace.clone(),
                row.name.clone(),
                row.ticker.clone(),
                row.price.clone().unwrap_or_else(|| String::from("-")),
                row.last_updated.clone().unwrap_or_else(|| String::from("-")),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(String::from), &widths);
    for (row, source) in cells.iter().zip(rows) {
        push_line(&mut out, row, &widths);
        if let Some(error) = &source.error {
            out.push_str("  ! ");
            out.push_str(error);
            out.push('\n');
        }
    }
    out
}

fn push_line(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}
