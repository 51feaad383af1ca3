use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{LogalError, Result};
use crate::types::FileFingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Char(char),
    Whitespace,
}

/// How to cut a published table into cells
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub file: &'static str,
    /// Header lines to drop before the first data row
    pub skip_rows: usize,
    pub delimiter: Delimiter,
}

impl TableSpec {
    pub const fn new(file: &'static str, skip_rows: usize, delimiter: Delimiter) -> Self {
        Self {
            file,
            skip_rows,
            delimiter,
        }
    }
}

/// One data line, split and trimmed
#[derive(Debug, Clone)]
pub struct TableLine {
    pub file: &'static str,
    /// 1-based line number in the file
    pub line_no: usize,
    pub cells: Vec<String>,
}

impl TableLine {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    pub fn required(&self, index: usize) -> Result<&str> {
        self.cell(index).ok_or_else(|| {
            LogalError::parse(
                self.file,
                self.line_no,
                format!("expected at least {} columns, found {}", index + 1, self.cells.len()),
            )
        })
    }

    /// Parse a numeric cell; blanks and NaN count as errors
    pub fn float(&self, index: usize) -> Result<f64> {
        let raw = self.required(index)?;
        parse_float(raw).ok_or_else(|| {
            LogalError::parse(self.file, self.line_no, format!("column {}: '{}' is not a number", index, raw))
        })
    }

    /// Parse a numeric cell, `None` when absent or not a number
    pub fn optional_float(&self, index: usize) -> Option<f64> {
        self.cell(index).and_then(parse_float)
    }

    pub fn error(&self, message: impl Into<String>) -> LogalError {
        LogalError::parse(self.file, self.line_no, message)
    }
}

#[derive(Debug, Clone)]
pub struct RawTable {
    pub fingerprint: FileFingerprint,
    pub lines: Vec<TableLine>,
}

/// Read and split a table file, fingerprinting its bytes.
pub fn load_table(dir: &Path, spec: &TableSpec) -> Result<RawTable> {
    let path = dir.join(spec.file);
    let bytes = fs::read(&path)?;
    let fingerprint = FileFingerprint {
        name: spec.file.to_string(),
        sha256: hex::encode(Sha256::digest(&bytes)),
        bytes: bytes.len() as u64,
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines = split_lines(spec, &text);
    debug!(
        "Loaded {} ({} data lines, sha256 {})",
        spec.file,
        lines.len(),
        &fingerprint.sha256[..12]
    );
    Ok(RawTable { fingerprint, lines })
}

fn split_lines(spec: &TableSpec, text: &str) -> Vec<TableLine> {
    text.lines()
        .enumerate()
        .skip(spec.skip_rows)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| TableLine {
            file: spec.file,
            line_no: i + 1,
            cells: split_cells(line, spec.delimiter),
        })
        .collect()
}

pub fn split_cells(line: &str, delimiter: Delimiter) -> Vec<String> {
    match delimiter {
        Delimiter::Char(c) => line.split(c).map(|s| s.trim().to_string()).collect(),
        Delimiter::Whitespace => line.split_whitespace().map(str::to_string).collect(),
    }
}

/// Strip the LaTeX residue tables carry around numbers.
pub fn strip_latex(cell: &str) -> String {
    let mut s = cell.replace("\\\\", "");
    for token in ["tt", "\\", "{", "}", "phm", "$", ":"] {
        s = s.replace(token, "");
    }
    s.trim().to_string()
}

/// Lenient float parser for table cells: tolerates tabs, a trailing LaTeX
/// row terminator and Unicode minus signs. NaN is treated as missing.
pub fn parse_float(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .trim_end_matches("\\\\")
        .replace('\u{2212}', "-")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_float_variants() {
        assert_eq!(parse_float(" 1.5 "), Some(1.5));
        assert_eq!(parse_float("\t-2e-3\t"), Some(-2e-3));
        assert_eq!(parse_float("12.1 \\\\"), Some(12.1));
        assert_eq!(parse_float("\u{2212}3"), Some(-3.0));
        assert_eq!(parse_float("nan"), None);
        assert_eq!(parse_float("..."), None);
        assert_eq!(parse_float(""), None);
    }

    #[test]
    fn test_strip_latex() {
        assert_eq!(strip_latex("{\\tt 12.04}"), "12.04");
        assert_eq!(strip_latex("11.93\\phm{:}"), "11.93");
    }

    #[test]
    fn test_load_table_skips_header_and_blank_lines() {
        let dir = tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("t.txt")).unwrap();
        writeln!(f, "header one").unwrap();
        writeln!(f, "header two").unwrap();
        writeln!(f, "NGC 1 & 2.0 & x").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "NGC 2 & 3.0 & y \\\\").unwrap();

        let spec = TableSpec::new("t.txt", 2, Delimiter::Char('&'));
        let table = load_table(dir.path(), &spec).unwrap();
        assert_eq!(table.lines.len(), 2);
        assert_eq!(table.lines[0].line_no, 3);
        assert_eq!(table.lines[0].cell(0), Some("NGC 1"));
        assert_eq!(table.lines[1].float(1).unwrap(), 3.0);
        assert_eq!(table.fingerprint.sha256.len(), 64);
        assert!(table.lines[0].float(7).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let spec = TableSpec::new("absent.txt", 0, Delimiter::Whitespace);
        assert!(matches!(load_table(dir.path(), &spec), Err(LogalError::Io(_))));
    }
}
