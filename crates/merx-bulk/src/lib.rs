//! # Merx Bulk Operations Engine
//!
//! Executes large chunked mutations (import/update/delete) against the
//! internal store, plus CSV export:
//!
//! - CSV parsing with a configurable column-to-field mapping ([`csv`])
//! - Per-entity validation before any mutation ([`validation`])
//! - Chunked execution with bounded concurrency: up to `max_concurrent`
//!   chunks in flight, records within a chunk strictly sequential
//! - Cooperative cancellation, checked between chunks
//! - Reversible rollback from per-record captured before-values, in
//!   reverse completion order
//!
//! One [`BulkOperation`] is an independently scheduled unit of work;
//! [`BulkEngine::start`] returns immediately and processing continues
//! on a spawned task.

pub mod csv;
pub mod engine;
pub mod error;
pub mod operation;
pub mod validation;

pub use crate::csv::{parse_records, write_report, CsvOptions, Delimiter, FieldMapping, FieldType, ParseOutcome};
pub use engine::{BulkEngine, BulkProgress};
pub use error::{BulkError, BulkResult};
pub use operation::{
    BulkOperation, BulkOperationRecord, BulkOptions, BulkRecord, BulkStatus, OperationType,
    RecordAction, RecordStatus,
};
pub use validation::validate_record;
