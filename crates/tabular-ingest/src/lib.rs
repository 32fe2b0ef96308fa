//! Schema discovery for CSV partitions.
//!
//! A partition whose data source is a directory and whose query is a CSV
//! file name can be described by [`CsvSchemaSource`], letting the session
//! create typed data columns from the file's header and a sample of rows.

pub mod csv_schema;
pub mod error;

pub use csv_schema::{CsvSample, CsvSchemaSource, infer_type_name, read_csv_sample};
pub use error::{IngestError, Result};
