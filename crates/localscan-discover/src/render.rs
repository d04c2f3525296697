//! Final result rendering: bordered table, JSON or CSV.
//!
//! The status column only appears when at least one entry carries a diff
//! status. Missing enrichment fields print as `-` in the table and CSV.

use std::io::Write;
use std::time::Duration;

use localscan_core::DetectionResult;
use serde::Serialize;

use crate::config::OutputFormat;
use crate::error::Result;

const MISSING: &str = "-";

pub fn render<W: Write>(
    format: OutputFormat,
    results: &[DetectionResult],
    elapsed: Duration,
    out: W,
) -> Result<()> {
    match format {
        OutputFormat::Table => render_table(results, elapsed, out),
        OutputFormat::Json => render_json(results, out),
        OutputFormat::Csv => render_csv(results, out),
    }
}

/// `22,80,443`, or `-` when nothing was open.
pub fn format_ports(ports: &[u16]) -> String {
    if ports.is_empty() {
        return MISSING.to_string();
    }
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Seconds with one decimal, e.g. `12.3s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

fn has_status(results: &[DetectionResult]) -> bool {
    results.iter().any(|r| r.status.is_some())
}

/// Text cells for one result, in column order.
fn row_cells(result: &DetectionResult, with_status: bool) -> Vec<String> {
    let opt = |field: &Option<String>| field.clone().unwrap_or_else(|| MISSING.to_string());
    let mut cells = vec![
        result.address.to_string(),
        opt(&result.hostname),
        opt(&result.mac),
        opt(&result.vendor),
        result.method.to_string(),
        format_ports(&result.open_ports),
    ];
    if with_status {
        cells.push(result.status.map(|s| s.to_string()).unwrap_or_default());
    }
    cells
}

pub fn render_table<W: Write>(results: &[DetectionResult], elapsed: Duration, mut out: W) -> Result<()> {
    if results.is_empty() {
        writeln!(out, "No devices found.")?;
        return Ok(());
    }

    let with_status = has_status(results);
    let mut headers = vec!["#", "IP Address", "Hostname", "MAC Address", "Vendor", "Method", "Ports"];
    if with_status {
        headers.push("Status");
    }

    let rows: Vec<Vec<String>> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut cells = vec![(i + 1).to_string()];
            cells.extend(row_cells(r, with_status));
            cells
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            rows.iter()
                .map(|row| row[col].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let separator = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{separator}+");

    writeln!(out, "{separator}")?;
    let header_cells: Vec<String> = headers
        .iter()
        .zip(widths.iter().copied())
        .enumerate()
        .map(|(col, (h, w))| {
            if col == 0 {
                format!(" {h:^w$} ")
            } else {
                format!(" {h:<w$} ")
            }
        })
        .collect();
    writeln!(out, "|{}|", header_cells.join("|"))?;
    writeln!(out, "{separator}")?;

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(widths.iter().copied())
            .enumerate()
            .map(|(col, (cell, w))| {
                if col == 0 {
                    format!(" {cell:>w$} ")
                } else {
                    format!(" {cell:<w$} ")
                }
            })
            .collect();
        writeln!(out, "|{}|", cells.join("|"))?;
    }

    writeln!(out, "{separator}")?;
    writeln!(
        out,
        "Found {} devices in {}",
        results.len(),
        format_elapsed(elapsed)
    )?;
    Ok(())
}

#[derive(Serialize)]
struct JsonRow<'a> {
    ip: String,
    hostname: Option<&'a str>,
    mac: Option<&'a str>,
    vendor: Option<&'a str>,
    method: &'static str,
    open_ports: &'a [u16],
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

impl<'a> From<&'a DetectionResult> for JsonRow<'a> {
    fn from(r: &'a DetectionResult) -> Self {
        Self {
            ip: r.address.to_string(),
            hostname: r.hostname.as_deref(),
            mac: r.mac.as_deref(),
            vendor: r.vendor.as_deref(),
            method: r.method.as_str(),
            open_ports: &r.open_ports,
            status: r.status.map(|s| s.as_str()),
        }
    }
}

/// Pretty-printed array; `status` only present on classified entries.
pub fn render_json<W: Write>(results: &[DetectionResult], mut out: W) -> Result<()> {
    let rows: Vec<JsonRow<'_>> = results.iter().map(JsonRow::from).collect();
    serde_json::to_writer_pretty(&mut out, &rows)?;
    writeln!(out)?;
    Ok(())
}

pub fn render_csv<W: Write>(results: &[DetectionResult], out: W) -> Result<()> {
    let with_status = has_status(results);
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["IP", "Hostname", "MAC", "Vendor", "Method", "OpenPorts"];
    if with_status {
        header.push("Status");
    }
    writer.write_record(&header)?;

    for result in results {
        writer.write_record(row_cells(result, with_status))?;
    }
    writer.flush()?;
    Ok(())
}
