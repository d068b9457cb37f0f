//! Batch dump tool.
//!
//! Reads a serialized batch from disk and renders either its records in
//! append order or its index in key order.
//!
//! # Environment Variables
//!
//! - `WBWI_DUMP_INPUT`: Path of the serialized batch (required)
//! - `WBWI_DUMP_VIEW`: `records` or `index` (default: `records`)
//! - `WBWI_DUMP_EXPECTED_CRC`: CRC32 the contents should have, in hex (optional)

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use crate::error::WriteBatchError;
use crate::index::WriteBatchWithIndex;
use crate::options::WriteBatchWithIndexOptions;
use crate::record::WriteType;
use crate::write_batch::WriteBatch;

const INPUT_VAR: &str = "WBWI_DUMP_INPUT";
const VIEW_VAR: &str = "WBWI_DUMP_VIEW";
const EXPECTED_CRC_VAR: &str = "WBWI_DUMP_EXPECTED_CRC";

/// What to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpView {
    /// Every record in append order.
    Records,
    /// Index entries in key order, then the deleted ranges.
    Index,
}

impl DumpView {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "records" => Some(Self::Records),
            "index" => Some(Self::Index),
            _ => None,
        }
    }
}

/// Dump tool configuration.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub input: PathBuf,
    pub view: DumpView,
    pub expected_crc: Option<u32>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl DumpConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `WBWI_DUMP_INPUT` is not set or is empty
    /// - `WBWI_DUMP_VIEW` is set to anything but `records` or `index`
    /// - `WBWI_DUMP_EXPECTED_CRC` is set but not a hex `u32`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            input: Self::load_input()?,
            view: Self::load_view()?,
            expected_crc: Self::load_expected_crc()?,
        })
    }

    /// Like [`DumpConfig::from_env`], with `input` in place of
    /// `WBWI_DUMP_INPUT`.
    pub fn from_env_with_input(input: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            input: input.into(),
            view: Self::load_view()?,
            expected_crc: Self::load_expected_crc()?,
        })
    }

    /// Replace the input path.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    fn load_input() -> Result<PathBuf, ConfigError> {
        let input =
            std::env::var(INPUT_VAR).map_err(|_| ConfigError::MissingEnvVar(INPUT_VAR.to_string()))?;
        if input.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: INPUT_VAR.to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(PathBuf::from(input))
    }

    fn load_view() -> Result<DumpView, ConfigError> {
        match std::env::var(VIEW_VAR) {
            Ok(value) => DumpView::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                name: VIEW_VAR.to_string(),
                message: format!("'{value}' is not a view (expected 'records' or 'index')"),
            }),
            Err(_) => Ok(DumpView::Records),
        }
    }

    fn load_expected_crc() -> Result<Option<u32>, ConfigError> {
        match std::env::var(EXPECTED_CRC_VAR) {
            Ok(value) => parse_crc(&value).map(Some).ok_or_else(|| ConfigError::InvalidValue {
                name: EXPECTED_CRC_VAR.to_string(),
                message: format!("'{value}' is not a hex CRC32"),
            }),
            Err(_) => Ok(None),
        }
    }
}

fn parse_crc(value: &str) -> Option<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}

/// Error returned when a dump fails.
#[derive(Debug)]
pub enum DumpError {
    /// The input could not be read.
    Io(std::io::Error),
    /// The input is not a well-formed batch.
    Batch(WriteBatchError),
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read batch: {e}"),
            Self::Batch(e) => write!(f, "malformed batch: {e}"),
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Batch(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for DumpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<WriteBatchError> for DumpError {
    fn from(e: WriteBatchError) -> Self {
        Self::Batch(e)
    }
}

/// Read the configured batch and render it.
///
/// A checksum mismatch is logged and the batch is still rendered.
pub fn run(config: &DumpConfig) -> Result<String, DumpError> {
    let data = std::fs::read(&config.input)?;
    let batch = WriteBatch::from_data(data)?;
    tracing::info!(
        "loaded {} ({} bytes, {} records)",
        config.input.display(),
        batch.data_size(),
        batch.count()
    );

    if let Some(expected) = config.expected_crc {
        if let Err(e) = batch.verify_checksum(expected) {
            tracing::warn!("{}: {e}", config.input.display());
        }
    }

    match config.view {
        DumpView::Records => render_records(&batch),
        DumpView::Index => {
            let wbwi =
                WriteBatchWithIndex::from_write_batch(batch, &[], WriteBatchWithIndexOptions::new())?;
            render_index(&wbwi)
        }
    }
}

/// One line per record: offset, type, column family and payload.
pub fn render_records(batch: &WriteBatch) -> Result<String, DumpError> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "sequence {} count {} crc {:#010x}",
        batch.sequence(),
        batch.count(),
        batch.checksum()
    );
    for item in batch.records() {
        let (offset, spans) = item?;
        let record = spans.view(batch.data());
        let _ = write!(out, "@{offset} {:?} cf={}", record.tag, record.column_family);
        match record.write_type {
            WriteType::Put | WriteType::Merge => {
                let _ = write!(
                    out,
                    " {} => {}",
                    record.key.escape_ascii(),
                    record.value.escape_ascii()
                );
            }
            WriteType::Delete | WriteType::SingleDelete => {
                let _ = write!(out, " {}", record.key.escape_ascii());
            }
            WriteType::DeleteRange => {
                let _ = write!(
                    out,
                    " [{}, {})",
                    record.key.escape_ascii(),
                    record.value.escape_ascii()
                );
            }
            WriteType::LogData => {
                let _ = write!(out, " {}", record.blob.escape_ascii());
            }
            WriteType::Xid => {
                if !record.xid.is_empty() {
                    let _ = write!(out, " xid={}", record.xid.escape_ascii());
                }
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Index entries in key order, then the deleted ranges.
pub fn render_index(wbwi: &WriteBatchWithIndex) -> Result<String, DumpError> {
    let mut out = String::new();
    let _ = writeln!(out, "{} index entries", wbwi.index_len());
    for entry in wbwi.index_entries() {
        let record = wbwi.write_batch().entry_at(entry.offset)?;
        let _ = write!(
            out,
            "cf={} {} @{} {:?}",
            entry.column_family,
            entry.key(wbwi.data()).escape_ascii(),
            entry.offset,
            record.write_type
        );
        if matches!(record.write_type, WriteType::Put | WriteType::Merge) {
            let _ = write!(out, " {}", record.value.escape_ascii());
        }
        if entry.is_in_deleted_range {
            out.push_str(" (range deleted)");
        }
        out.push('\n');
    }

    let ranges = wbwi.deleted_ranges();
    let _ = writeln!(out, "{} deleted ranges", ranges.len());
    for range in ranges {
        let _ = writeln!(
            out,
            "cf={} [{}, {})",
            range.column_family,
            range.begin.escape_ascii(),
            range.end.escape_ascii()
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample() -> WriteBatchWithIndex {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"2").unwrap();
        wbwi.put(b"a", b"1").unwrap();
        wbwi.merge(b"c", b"x").unwrap();
        wbwi.put_log_data(b"blob").unwrap();
        wbwi.delete_range(b"a", b"b").unwrap();
        wbwi
    }

    #[test]
    fn test_parse_crc() {
        assert_eq!(parse_crc("0x1f"), Some(0x1f));
        assert_eq!(parse_crc("DEADBEEF"), Some(0xdead_beef));
        assert_eq!(parse_crc("xyz"), None);
        assert_eq!(parse_crc("123456789"), None);
    }

    #[test]
    fn test_dump_view_parse() {
        assert_eq!(DumpView::parse("records"), Some(DumpView::Records));
        assert_eq!(DumpView::parse("index"), Some(DumpView::Index));
        assert_eq!(DumpView::parse("Index"), None);
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingEnvVar(INPUT_VAR.to_string());
        assert_eq!(
            error.to_string(),
            "missing required environment variable: WBWI_DUMP_INPUT"
        );
        let error = ConfigError::InvalidValue {
            name: VIEW_VAR.to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for WBWI_DUMP_VIEW: bad value");
    }

    #[test]
    fn test_render_records_in_append_order() {
        let wbwi = sample();
        let out = render_records(wbwi.write_batch()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("sequence 0 count 4"));
        assert!(lines[1].ends_with("b => 2"));
        assert!(lines[2].ends_with("a => 1"));
        assert!(lines[3].ends_with("c => x"));
        assert!(lines[4].ends_with("blob"));
        assert!(lines[5].ends_with("[a, b)"));
    }

    #[test]
    fn test_render_index_in_key_order() {
        let wbwi = sample();
        let out = render_index(&wbwi).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "3 index entries");
        assert!(lines[1].starts_with("cf=0 a "));
        assert!(lines[1].ends_with("(range deleted)"));
        assert!(lines[2].starts_with("cf=0 b "));
        assert!(!lines[2].ends_with("(range deleted)"));
        assert!(lines[3].starts_with("cf=0 c "));
        assert_eq!(lines[4], "1 deleted ranges");
        assert_eq!(lines[5], "cf=0 [a, b)");
    }

    #[test]
    fn test_run_reads_batch_from_disk() {
        let wbwi = sample();
        let crc = wbwi.write_batch().checksum();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(wbwi.data()).unwrap();

        let config = DumpConfig {
            input: file.path().to_path_buf(),
            view: DumpView::Index,
            expected_crc: Some(crc),
        };
        let out = run(&config).unwrap();
        assert_eq!(out, render_index(&wbwi).unwrap());

        // A mismatch is reported but does not stop the dump.
        let config = DumpConfig {
            view: DumpView::Records,
            expected_crc: Some(crc ^ 1),
            ..config
        };
        let out = run(&config).unwrap();
        assert!(out.starts_with("sequence 0 count 4"));
    }

    #[test]
    fn test_run_rejects_truncated_batch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 4]).unwrap();
        let config = DumpConfig {
            input: PathBuf::new(),
            view: DumpView::Records,
            expected_crc: None,
        }
        .with_input(file.path());
        let err = run(&config).unwrap_err();
        assert!(matches!(err, DumpError::Batch(ref e) if e.is_corruption()));

        let config = config.with_input("/nonexistent/wbwi/batch");
        assert!(matches!(run(&config), Err(DumpError::Io(_))));
    }
}
