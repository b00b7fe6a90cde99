//! # Output Formatters
//!
//! Terminal renderings of result batches. Tail mode prints one line per
//! message, dump mode prints CSV, and term queries print the distinct
//! values joined by `;` in either mode.

use std::io::Write;

use bonfire_core::{OutputSink, Record, Terms};
use chrono::{DateTime, Local};
use serde_json::Value;

const TIMESTAMP: &str = "timestamp";
const MESSAGE: &str = "message";
const TERM_SEPARATOR: &str = ";";

/// Text of one attribute. Missing and null attributes render empty.
fn value_text(record: &Record, field: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Graylog timestamps are RFC 3339 in UTC; show them in local time.
fn local_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Attributes to show when no field list was requested.
fn all_fields(record: &Record) -> Vec<String> {
    record
        .keys()
        .filter(|k| k.as_str() != TIMESTAMP)
        .cloned()
        .collect()
}

fn write_terms<W: Write>(out: &mut W, terms: &Terms) -> bonfire_core::Result<()> {
    let keys: Vec<&str> = terms.iter().map(|(key, _)| key.as_str()).collect();
    writeln!(out, "{}", keys.join(TERM_SEPARATOR))?;
    out.flush()?;
    Ok(())
}

/// One line per message: local timestamp, then the requested attributes
/// with `message` moved to the end.
pub struct TailFormatter<W: Write> {
    out: W,
}

impl<W: Write> TailFormatter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(record: &Record, fields: &[String]) -> String {
        let mut parts = Vec::with_capacity(fields.len() + 1);
        if !fields.iter().any(|f| f == TIMESTAMP) {
            if let Some(Value::String(ts)) = record.get(TIMESTAMP) {
                parts.push(local_timestamp(ts));
            }
        }
        let message = fields.iter().filter(|f| *f == MESSAGE);
        for field in fields.iter().filter(|f| *f != MESSAGE).chain(message) {
            let text = if field == TIMESTAMP {
                local_timestamp(&value_text(record, field))
            } else {
                value_text(record, field)
            };
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }
}

impl<W: Write> OutputSink for TailFormatter<W> {
    fn emit(&mut self, batch: &[Record], fields: Option<&[String]>) -> bonfire_core::Result<()> {
        for record in batch {
            let line = match fields {
                Some(fields) => Self::line(record, fields),
                None => Self::line(record, &all_fields(record)),
            };
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn emit_terms(&mut self, terms: &Terms) -> bonfire_core::Result<()> {
        write_terms(&mut self.out, terms)
    }
}

/// CSV with a `timestamp` column first. The header is written once, from
/// the field list of the first batch.
pub struct DumpFormatter<W: Write> {
    out: W,
    columns: Option<Vec<String>>,
}

impl<W: Write> DumpFormatter<W> {
    pub fn new(out: W) -> Self {
        Self { out, columns: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn columns_for(batch: &[Record], fields: Option<&[String]>) -> Vec<String> {
        let mut columns = vec![TIMESTAMP.to_string()];
        match fields {
            Some(fields) => columns.extend(fields.iter().filter(|f| *f != TIMESTAMP).cloned()),
            None => {
                if let Some(first) = batch.first() {
                    columns.extend(all_fields(first));
                }
            }
        }
        columns
    }

    fn write_row<'a>(&mut self, cells: impl Iterator<Item = &'a str>) -> std::io::Result<()> {
        let row: Vec<String> = cells.map(csv_cell).collect();
        writeln!(self.out, "{}", row.join(","))
    }
}

/// Quote a cell when it holds a separator, a quote or a line break.
fn csv_cell(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

impl<W: Write> OutputSink for DumpFormatter<W> {
    fn emit(&mut self, batch: &[Record], fields: Option<&[String]>) -> bonfire_core::Result<()> {
        let columns = match self.columns.take() {
            Some(columns) => columns,
            None => {
                let columns = Self::columns_for(batch, fields);
                self.write_row(columns.iter().map(String::as_str))?;
                columns
            }
        };

        for record in batch {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| value_text(record, c))
                .collect();
            self.write_row(cells.iter().map(String::as_str))?;
        }
        self.columns = Some(columns);
        self.out.flush()?;
        Ok(())
    }

    fn emit_terms(&mut self, terms: &Terms) -> bonfire_core::Result<()> {
        write_terms(&mut self.out, terms)
    }
}
