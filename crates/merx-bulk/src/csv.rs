//! CSV parsing and report writing.
//!
//! Input files map onto entity attributes through a configurable
//! column-to-field table. Parsing is forgiving per row (a bad row
//! becomes a failed record, not a failed file) and strict about
//! structure (missing required headers or a blown row limit reject the
//! whole file).

use chrono::{DateTime, Utc};

use crate::error::{BulkError, BulkResult};
use crate::operation::{BulkOperationRecord, BulkRecord};

/// Maximum rows accepted per file unless configured otherwise.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// UTF-8 byte order mark, stripped before parsing.
const UTF8_BOM: &str = "\u{feff}";

/// Supported field delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Comma (default).
    #[default]
    Comma,
    /// Semicolon, common in European exports.
    Semicolon,
    /// Tab.
    Tab,
    /// Pipe.
    Pipe,
}

impl Delimiter {
    /// The delimiter byte for the csv reader.
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
        }
    }

    /// Parse a delimiter from user input.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "," | "comma" => Ok(Delimiter::Comma),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            "\t" | "tab" | "\\t" => Ok(Delimiter::Tab),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            _ => Err(format!(
                "invalid delimiter '{s}'; valid values: ',', ';', '\\t', '|'"
            )),
        }
    }
}

/// How a column's raw text becomes an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    /// Keep the text as-is.
    #[default]
    Text,
    /// Parse as a 64-bit integer.
    Integer,
    /// Parse as a float.
    Float,
    /// Parse as a boolean (`true/false`, `yes/no`, `1/0`).
    Boolean,
}

#[derive(Debug, Clone)]
struct FieldEntry {
    column: String,
    field: String,
    ty: FieldType,
    required: bool,
}

/// Column-to-field mapping table.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    entries: Vec<FieldEntry>,
}

impl FieldMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a text column onto a field.
    #[must_use]
    pub fn field(self, column: &str, field: &str) -> Self {
        self.typed_field(column, field, FieldType::Text)
    }

    /// Map a column onto a field with a coercion type.
    #[must_use]
    pub fn typed_field(mut self, column: &str, field: &str, ty: FieldType) -> Self {
        self.entries.push(FieldEntry {
            column: column.to_string(),
            field: field.to_string(),
            ty,
            required: false,
        });
        self
    }

    /// Mark a previously mapped column as required: its header must be
    /// present and its cells non-empty.
    #[must_use]
    pub fn require(mut self, column: &str) -> Self {
        for entry in &mut self.entries {
            if entry.column == column {
                entry.required = true;
            }
        }
        self
    }

    /// Number of mapped columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parser options.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter.
    pub delimiter: Delimiter,
    /// Maximum data rows accepted.
    pub max_rows: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

/// One row that could not be parsed.
#[derive(Debug, Clone)]
pub struct RowError {
    /// 0-based record index of the bad row.
    pub index: usize,
    /// 1-based file line (header is line 1).
    pub line: usize,
    /// What went wrong.
    pub message: String,
}

/// Result of parsing one file: good records plus per-row errors.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Successfully parsed records, in file order.
    pub records: Vec<BulkRecord>,
    /// Rows that failed to parse.
    pub errors: Vec<RowError>,
}

impl ParseOutcome {
    /// Total input rows seen (good and bad).
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.errors.len()
    }

    /// Wrap already-parsed records (for hosts that do not read CSV).
    #[must_use]
    pub fn from_records(records: Vec<BulkRecord>) -> Self {
        Self {
            records,
            errors: Vec::new(),
        }
    }
}

fn coerce(raw: &str, ty: FieldType) -> Result<serde_json::Value, String> {
    match ty {
        FieldType::Text => Ok(serde_json::Value::String(raw.to_string())),
        FieldType::Integer => raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("'{raw}' is not an integer")),
        FieldType::Float => raw
            .parse::<f64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("'{raw}' is not a number")),
        FieldType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(serde_json::Value::Bool(true)),
            "false" | "no" | "0" => Ok(serde_json::Value::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        },
    }
}

/// Parse a delimited file into bulk records.
///
/// The first line must be a header row. Headers are matched
/// case-insensitively after trimming. A missing required header or a
/// file exceeding `max_rows` rejects the whole file; a bad cell only
/// fails its row.
pub fn parse_records(
    input: &str,
    mapping: &FieldMapping,
    options: &CsvOptions,
) -> BulkResult<ParseOutcome> {
    if mapping.is_empty() {
        return Err(BulkError::invalid_options("field mapping is empty"));
    }
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(options.delimiter.as_byte())
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| BulkError::parse(1, e.to_string()))?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    // Resolve each mapped column to its header position up front.
    let mut positions: Vec<(usize, &FieldEntry)> = Vec::new();
    for entry in &mapping.entries {
        match headers.iter().position(|h| *h == entry.column.to_lowercase()) {
            Some(pos) => positions.push((pos, entry)),
            None if entry.required => {
                return Err(BulkError::parse(
                    1,
                    format!("missing required column '{}'", entry.column),
                ));
            }
            None => {}
        }
    }

    let mut outcome = ParseOutcome::default();
    for (index, row) in reader.records().enumerate() {
        if outcome.total_rows() >= options.max_rows {
            return Err(BulkError::parse(
                index + 2,
                format!("file exceeds the {} row limit", options.max_rows),
            ));
        }
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                outcome.errors.push(RowError {
                    index,
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let mut attributes = serde_json::Map::new();
        let mut row_error: Option<String> = None;
        for (pos, entry) in &positions {
            let raw = row.get(*pos).unwrap_or_default();
            if raw.is_empty() {
                if entry.required {
                    row_error = Some(format!("column '{}' is empty", entry.column));
                    break;
                }
                continue;
            }
            match coerce(raw, entry.ty) {
                Ok(value) => {
                    attributes.insert(entry.field.clone(), value);
                }
                Err(message) => {
                    row_error = Some(format!("column '{}': {message}", entry.column));
                    break;
                }
            }
        }

        match row_error {
            Some(message) => outcome.errors.push(RowError {
                index,
                line,
                message,
            }),
            None => outcome.records.push(BulkRecord {
                index,
                attributes: serde_json::Value::Object(attributes),
            }),
        }
    }

    Ok(outcome)
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_default()
}

/// Write the per-record outcome report: one row per record with index,
/// action, status, error, and processed timestamp.
pub fn write_report(records: &[BulkOperationRecord]) -> BulkResult<String> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(["record_index", "action", "status", "error", "processed_at"])?;

    for record in records {
        writer.write_record([
            record.index.to_string(),
            record.action.to_string(),
            record.status.to_string(),
            record.error.clone().unwrap_or_default(),
            format_timestamp(record.processed_at),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BulkError::parse(0, e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| BulkError::parse(0, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{RecordAction, RecordStatus};

    fn inventory_mapping() -> FieldMapping {
        FieldMapping::new()
            .field("sku", "sku")
            .typed_field("qty", "quantity", FieldType::Integer)
            .require("sku")
            .require("qty")
    }

    #[test]
    fn test_parse_happy_path() {
        let input = "sku,qty\nSKU-1,5\nSKU-2,9\n";
        let outcome = parse_records(input, &inventory_mapping(), &CsvOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.records[0].attributes["sku"], "SKU-1");
        assert_eq!(outcome.records[0].attributes["quantity"], 5);
        assert_eq!(outcome.records[1].index, 1);
    }

    #[test]
    fn test_parse_strips_bom_and_ignores_header_case() {
        let input = "\u{feff}SKU,QTY\nSKU-1,5\n";
        let outcome = parse_records(input, &inventory_mapping(), &CsvOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn test_parse_semicolon_delimiter() {
        let input = "sku;qty\nSKU-1;5\n";
        let options = CsvOptions {
            delimiter: Delimiter::Semicolon,
            ..CsvOptions::default()
        };
        let outcome = parse_records(input, &inventory_mapping(), &options).unwrap();
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn test_missing_required_header_rejects_file() {
        let input = "sku,count\nSKU-1,5\n";
        let err = parse_records(input, &inventory_mapping(), &CsvOptions::default()).unwrap_err();
        assert!(err.to_string().contains("qty"));
    }

    #[test]
    fn test_bad_cell_fails_only_its_row() {
        let input = "sku,qty\nSKU-1,five\nSKU-2,9\n";
        let outcome = parse_records(input, &inventory_mapping(), &CsvOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 0);
        assert_eq!(outcome.errors[0].line, 2);
        assert!(outcome.errors[0].message.contains("not an integer"));
    }

    #[test]
    fn test_empty_required_cell_fails_row() {
        let input = "sku,qty\n,5\n";
        let outcome = parse_records(input, &inventory_mapping(), &CsvOptions::default()).unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.errors[0].message.contains("sku"));
    }

    #[test]
    fn test_optional_empty_cell_is_omitted() {
        let mapping = FieldMapping::new()
            .field("sku", "sku")
            .field("name", "name")
            .require("sku");
        let input = "sku,name\nSKU-1,\n";
        let outcome = parse_records(input, &mapping, &CsvOptions::default()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].attributes.get("name").is_none());
    }

    #[test]
    fn test_row_limit_rejects_file() {
        let options = CsvOptions {
            max_rows: 2,
            ..CsvOptions::default()
        };
        let input = "sku,qty\nA,1\nB,2\nC,3\n";
        let err = parse_records(input, &inventory_mapping(), &options).unwrap_err();
        assert!(err.to_string().contains("row limit"));
    }

    #[test]
    fn test_delimiter_parse() {
        assert_eq!(Delimiter::parse(";").unwrap(), Delimiter::Semicolon);
        assert_eq!(Delimiter::parse("tab").unwrap(), Delimiter::Tab);
        assert!(Delimiter::parse("~").is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        let mapping = FieldMapping::new()
            .field("sku", "sku")
            .typed_field("active", "active", FieldType::Boolean);
        let input = "sku,active\nA,yes\nB,false\n";
        let outcome = parse_records(input, &mapping, &CsvOptions::default()).unwrap();
        assert_eq!(outcome.records[0].attributes["active"], true);
        assert_eq!(outcome.records[1].attributes["active"], false);
    }

    #[test]
    fn test_report_layout() {
        let mut success = BulkOperationRecord::pending(0);
        success.action = RecordAction::Created;
        success.status = RecordStatus::Success;
        success.processed_at = Some(Utc::now());

        let mut failed = BulkOperationRecord::pending(1);
        failed.action = RecordAction::None;
        failed.status = RecordStatus::Failed;
        failed.error = Some("missing required field: sku".to_string());

        let report = write_report(&[success, failed]).unwrap();
        let mut lines = report.lines();
        assert_eq!(
            lines.next().unwrap(),
            "record_index,action,status,error,processed_at"
        );
        assert!(lines.next().unwrap().starts_with("0,created,success,,"));
        assert!(lines
            .next()
            .unwrap()
            .starts_with("1,none,failed,missing required field: sku,"));
    }
}
