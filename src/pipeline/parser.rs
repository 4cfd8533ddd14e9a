//! Tabular parser: CSV or spreadsheet bytes into header-keyed rows

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use thiserror::Error;

use crate::core::record::{SourceRow, SourceTable};

/// Declared source format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Tsv,
    Spreadsheet,
}

impl SourceFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(SourceFormat::Csv),
            "tsv" | "tab" => Some(SourceFormat::Tsv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "tsv" => Ok(SourceFormat::Tsv),
            "spreadsheet" | "xlsx" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
            _ => Err(format!(
                "unsupported format '{}' (valid: csv, tsv, spreadsheet)",
                s
            )),
        }
    }
}

/// Declared text encoding for delimited sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Windows1251,
    Iso8859_1,
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "windows-1251" | "cp1251" | "win1251" => Ok(TextEncoding::Windows1251),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(TextEncoding::Iso8859_1),
            _ => Err(format!(
                "unsupported encoding '{}' (valid: utf-8, windows-1251, iso-8859-1)",
                s
            )),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Windows1251 => write!(f, "windows-1251"),
            TextEncoding::Iso8859_1 => write!(f, "iso-8859-1"),
        }
    }
}

/// Malformed or unreadable source. Fatal to the whole job.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("source is not valid {encoding} text")]
    Encoding { encoding: TextEncoding },

    #[error("malformed CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    #[error("unreadable spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parse source bytes into headers and rows.
///
/// Empty or headerless input yields an empty table rather than an error.
pub fn parse(
    bytes: &[u8],
    format: SourceFormat,
    encoding: TextEncoding,
) -> Result<SourceTable, ParseError> {
    let grid = match format {
        SourceFormat::Csv => read_delimited(&decode(bytes, encoding)?, b',')?,
        SourceFormat::Tsv => read_delimited(&decode(bytes, encoding)?, b'\t')?,
        SourceFormat::Spreadsheet => read_spreadsheet(bytes)?,
    };
    Ok(build_table(grid))
}

/// Read and parse a file, detecting the format from its extension unless forced
pub fn parse_file(
    path: &Path,
    format: Option<SourceFormat>,
    encoding: TextEncoding,
) -> Result<SourceTable, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let format = format
        .or_else(|| SourceFormat::from_path(path))
        .unwrap_or(SourceFormat::Csv);
    parse(&bytes, format, encoding)
}

fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<Cow<'_, str>, ParseError> {
    match encoding {
        TextEncoding::Utf8 => {
            let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            encoding_rs::UTF_8
                .decode_without_bom_handling_and_without_replacement(body)
                .ok_or(ParseError::Encoding { encoding })
        }
        TextEncoding::Windows1251 => {
            let (text, had_errors) = encoding_rs::WINDOWS_1251.decode_without_bom_handling(bytes);
            if had_errors {
                return Err(ParseError::Encoding { encoding });
            }
            Ok(text)
        }
        // Every byte is a code point; encoding_rs would substitute windows-1252
        TextEncoding::Iso8859_1 => Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
    }
}

/// A source line: its position in the file and its cells
type Line = (usize, Vec<String>);

fn read_delimited(text: &str, delimiter: u8) -> Result<Vec<Line>, ParseError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| ParseError::Csv {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            message: e.to_string(),
        })?;
        // The reader drops empty lines silently, so count from its position
        let line = record.position().map_or(grid.len() as u64, |p| p.line());
        grid.push((line as usize, record.iter().map(str::to_string).collect()));
    }
    Ok(grid)
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Vec<Line>, ParseError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range.map_err(|e| ParseError::Spreadsheet(e.to_string()))?;

    Ok(range
        .rows()
        .enumerate()
        .map(|(i, row)| (i, row.iter().map(render_cell).collect()))
        .collect())
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => render_float(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Whole floats render without a trailing ".0" (spreadsheets store 12 as 12.0)
fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Rows keep their data-line position, so skipped blank lines leave gaps
fn build_table(grid: Vec<Line>) -> SourceTable {
    let mut lines = grid
        .into_iter()
        .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()));

    let Some((header_at, header_line)) = lines.next() else {
        return SourceTable::default();
    };
    let headers: Vec<String> = header_line.iter().map(|h| h.trim().to_string()).collect();

    let rows = lines
        .map(|(at, cells)| {
            let pairs = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect();
            SourceRow::new(at.saturating_sub(header_at + 1), pairs)
        })
        .collect();

    SourceTable { headers, rows }
}
