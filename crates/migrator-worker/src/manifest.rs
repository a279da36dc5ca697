//! Batch manifest parsing.
//!
//! A manifest is an Excel workbook (first sheet) or a CSV file whose first
//! row names at least the `vm_name` and `target_az` columns. Other columns
//! are ignored and values are trimmed. Rows missing either value are
//! dropped. The format is detected from the content, not the file name.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook_from_rs};
use tracing;

use migrator_core::error::{AppError, ErrorKind};
use migrator_core::result::AppResult;
use migrator_core::types::MigrationRow;

/// Required header columns.
const REQUIRED_COLUMNS: [&str; 2] = ["vm_name", "target_az"];

/// Leading bytes of an xlsx file (a zip archive).
const XLSX_MAGIC: &[u8] = b"PK\x03\x04";

/// Leading bytes of a legacy xls file (an OLE compound document).
const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Manifest file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// Office Open XML workbook.
    Xlsx,
    /// Legacy binary workbook.
    Xls,
    /// Comma-separated values.
    Csv,
}

impl ManifestFormat {
    /// Detect the format from the leading bytes.
    pub fn detect(content: &[u8]) -> Self {
        if content.starts_with(XLSX_MAGIC) {
            Self::Xlsx
        } else if content.starts_with(XLS_MAGIC) {
            Self::Xls
        } else {
            Self::Csv
        }
    }
}

/// Read and parse a manifest file.
pub async fn load_manifest(path: &Path) -> AppResult<Vec<MigrationRow>> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Manifest,
            format!("Cannot read manifest '{}': {e}", path.display()),
            e,
        )
    })?;
    parse_manifest(&content)
}

/// Parse manifest content in any supported format.
pub fn parse_manifest(content: &[u8]) -> AppResult<Vec<MigrationRow>> {
    match ManifestFormat::detect(content) {
        ManifestFormat::Xlsx => parse_workbook::<Xlsx<_>>(content),
        ManifestFormat::Xls => parse_workbook::<Xls<_>>(content),
        ManifestFormat::Csv => parse_csv(content),
    }
}

fn parse_csv(content: &[u8]) -> AppResult<Vec<MigrationRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::manifest(format!("Unreadable manifest header: {e}")))?
        .iter()
        .map(String::from)
        .collect();

    // Header is line 1.
    let records = reader.records().enumerate().map(|(index, record)| {
        record
            .map(|r| r.iter().map(String::from).collect::<Vec<String>>())
            .map_err(|e| AppError::manifest(format!("Malformed manifest row {}: {e}", index + 2)))
    });
    collect_rows(&headers, records)
}

fn parse_workbook<R>(content: &[u8]) -> AppResult<Vec<MigrationRow>>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let mut workbook: R = open_workbook_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| AppError::manifest(format!("Unreadable manifest workbook: {e}")))?;
    let sheet = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::manifest("Manifest workbook has no sheet"))?
        .map_err(|e| AppError::manifest(format!("Unreadable manifest sheet: {e}")))?;
    sheet_rows(&sheet)
}

fn sheet_rows(sheet: &Range<Data>) -> AppResult<Vec<MigrationRow>> {
    let mut rows = sheet.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(cell_text).collect())
        .unwrap_or_default();
    let records = rows.map(|cells| -> AppResult<Vec<String>> {
        Ok(cells.iter().map(cell_text).collect())
    });
    collect_rows(&headers, records)
}

/// Trimmed text of a cell. Whole numbers lose their decimal part.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Map records onto rows using the header positions of the required
/// columns.
fn collect_rows<I>(headers: &[String], records: I) -> AppResult<Vec<MigrationRow>>
where
    I: Iterator<Item = AppResult<Vec<String>>>,
{
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| AppError::manifest(format!("Manifest is missing the '{name}' column")))
    };
    let [name_column, zone_column] = REQUIRED_COLUMNS;
    let (name_at, zone_at) = (column(name_column)?, column(zone_column)?);

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in records {
        let record = record?;
        let value = |at: usize| {
            record
                .get(at)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        match (value(name_at), value(zone_at)) {
            (Some(vm_name), Some(target_az)) => rows.push(MigrationRow { vm_name, target_az }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} incomplete manifest rows", dropped);
    }
    Ok(rows)
}
