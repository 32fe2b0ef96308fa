//! Error types for CSV schema ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while describing a CSV source.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Directory named as the data source does not exist.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// File named by the query does not exist.
    #[error("CSV file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Query is not a plain file name inside the data source directory.
    #[error("query '{query}' must name a file in the data source directory")]
    InvalidQuery { query: String },

    #[error("failed to parse CSV {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// CSV file has no header row.
    #[error("CSV file is empty: {path}")]
    EmptyCsv { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, IngestError>;
