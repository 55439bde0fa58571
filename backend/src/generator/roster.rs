//! Roster loading from CSV or workbook uploads.
//!
//! A roster is the uploaded spreadsheet: a header row naming the columns and
//! one row per certificate holder. CSV files go through the `csv` crate with
//! the delimiter guessed from the header line; `.xlsx`, `.xls`, `.xlsb` and
//! `.ods` workbooks are read with `calamine`, first sheet only. Rows whose
//! cells are all blank are dropped, so the row index used for code derivation
//! counts holders, not sheet lines.

use crate::generator::text::NAME_COLUMN;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("Spreadsheet has no worksheet")]
    NoWorksheet,
    #[error("Spreadsheet has no header row")]
    NoHeader,
    #[error("Spreadsheet must contain a 'Name' column")]
    MissingNameColumn,
    #[error("Unsupported spreadsheet format: .{0}")]
    UnsupportedFormat(String),
}

/// How the uploaded roster bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterFormat {
    Csv,
    Workbook,
}

impl RosterFormat {
    /// Picks the parser from the uploaded file name. Files without an
    /// extension are assumed to be workbooks.
    pub fn from_filename(filename: &str) -> Result<Self, RosterError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("txt") => Ok(RosterFormat::Csv),
            Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") | None => {
                Ok(RosterFormat::Workbook)
            }
            Some(other) => Err(RosterError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RosterFormat::Csv => "csv",
            RosterFormat::Workbook => "xlsx",
        }
    }
}

/// One holder's cells, keyed by column header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterRow {
    cells: HashMap<String, String>,
}

impl RosterRow {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            cells: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// The raw `Name` cell; empty when the row has none.
    pub fn name(&self) -> &str {
        self.get(NAME_COLUMN).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub columns: Vec<String>,
    pub rows: Vec<RosterRow>,
}

impl Roster {
    pub fn from_bytes(bytes: &[u8], format: RosterFormat) -> Result<Self, RosterError> {
        let table = match format {
            RosterFormat::Csv => read_csv(bytes)?,
            RosterFormat::Workbook => read_workbook(bytes)?,
        };
        Self::from_table(table)
    }

    /// Builds a roster from a header row followed by data rows.
    fn from_table(table: Vec<Vec<String>>) -> Result<Self, RosterError> {
        let mut lines = table.into_iter();
        let columns: Vec<String> = lines
            .next()
            .ok_or(RosterError::NoHeader)?
            .into_iter()
            .map(|c| normalize_cell(c.trim_start_matches('\u{feff}')))
            .collect();

        if !columns.iter().any(|c| c == NAME_COLUMN) {
            return Err(RosterError::MissingNameColumn);
        }

        let rows = lines
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|cells| {
                let values = cells
                    .iter()
                    .map(|c| normalize_cell(c))
                    .chain(std::iter::repeat(String::new()));
                RosterRow::from_pairs(columns.iter().cloned().zip(values))
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize_cell(cell: &str) -> String {
    cell.replace('\u{00A0}', " ").trim().to_string()
}

/// Picks the most frequent of `,` `;` tab `|` in the header line, preferring
/// the earlier candidate on ties and falling back to a comma.
fn detect_delimiter(header_line: &str) -> u8 {
    let mut best = (b',', 0usize);
    for d in [b',', b';', b'\t', b'|'] {
        let count = header_line.matches(d as char).count();
        if count > best.1 {
            best = (d, count);
        }
    }
    best.0
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, RosterError> {
    let header_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let header_line = String::from_utf8_lossy(&bytes[..header_end]);
    let delimiter = detect_delimiter(&header_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record?;
        table.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, RosterError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RosterError::NoWorksheet)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Text of a workbook cell as a person would read it in the sheet. Date
/// cells become `YYYY-MM-DD` (with the time only when it is not midnight)
/// instead of their serial number.
fn cell_text(cell: &Data) -> String {
    let datetime = match cell {
        Data::DateTime(value) if value.is_datetime() => value.as_datetime(),
        Data::DateTimeIso(value) => parse_iso_datetime(value),
        _ => None,
    };
    match datetime {
        Some(dt) => format_datetime(dt),
        None => cell.to_string(),
    }
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
