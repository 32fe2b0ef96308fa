use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use tracing::debug;

use tabular_core::{SchemaError, SchemaSource, SourceColumn};

use crate::error::{IngestError, Result};

/// Rows read when inferring column types.
pub const DEFAULT_SAMPLE_ROWS: usize = 200;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Header and leading rows of a CSV file.
#[derive(Debug, Clone, Default)]
pub struct CsvSample {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvSample {
    /// Values of column `index` across the sampled rows.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Read the header row and up to `max_rows` data rows. Blank rows are skipped.
pub fn read_csv_sample(path: &Path, max_rows: usize) -> Result<CsvSample> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut sample = CsvSample::default();
    let mut header_seen = false;
    for record in reader.records() {
        let record = record.map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        if !header_seen {
            sample.headers = record.iter().map(normalize_header).collect();
            header_seen = true;
            continue;
        }
        if sample.rows.len() >= max_rows {
            break;
        }
        sample.rows.push(record.iter().map(normalize_cell).collect());
    }
    if !header_seen {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    }
    Ok(sample)
}

fn is_boolean(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
}

fn is_datetime(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(value, format).is_ok())
}

/// Narrowest source type name every non-empty value fits.
///
/// Checked in order: `int64`, `double`, `boolean`, `datetime`, then
/// `string`. A column with no values is `string`.
pub fn infer_type_name<'a>(values: impl IntoIterator<Item = &'a str>) -> &'static str {
    let values: Vec<&str> = values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();
    if values.is_empty() {
        return "string";
    }
    if values.iter().all(|value| value.parse::<i64>().is_ok()) {
        "int64"
    } else if values.iter().all(|value| value.parse::<f64>().is_ok()) {
        "double"
    } else if values.iter().all(|value| is_boolean(value)) {
        "boolean"
    } else if values.iter().all(|value| is_datetime(value)) {
        "datetime"
    } else {
        "string"
    }
}

/// Describes CSV files: the data source is a directory and the query names
/// a file inside it.
#[derive(Debug, Clone)]
pub struct CsvSchemaSource {
    /// Base for relative data source directories.
    pub root: Option<PathBuf>,
    pub sample_rows: usize,
}

impl Default for CsvSchemaSource {
    fn default() -> Self {
        Self {
            root: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl CsvSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows;
        self
    }

    /// Path of the file a partition refers to.
    pub fn resolve(&self, data_source: &str, query: &str) -> Result<PathBuf> {
        let query = query.trim();
        let plain = Path::new(query)
            .file_name()
            .is_some_and(|name| name == query);
        if !plain {
            return Err(IngestError::InvalidQuery {
                query: query.to_string(),
            });
        }
        let mut dir = PathBuf::from(data_source.trim());
        if dir.is_relative()
            && let Some(root) = &self.root
        {
            dir = root.join(dir);
        }
        if !dir.is_dir() {
            return Err(IngestError::DirectoryNotFound { path: dir });
        }
        let path = dir.join(query);
        if !path.is_file() {
            return Err(IngestError::FileNotFound { path });
        }
        Ok(path)
    }

    /// Column names and inferred types of a CSV file. Blank headers get a
    /// positional name.
    pub fn describe_file(&self, path: &Path) -> Result<Vec<SourceColumn>> {
        let sample = read_csv_sample(path, self.sample_rows)?;
        let columns: Vec<SourceColumn> = sample
            .headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                let name = if header.is_empty() {
                    format!("Column{}", index + 1)
                } else {
                    header.clone()
                };
                SourceColumn::new(name, infer_type_name(sample.column(index)))
            })
            .collect();
        debug!(
            path = %path.display(),
            columns = columns.len(),
            rows = sample.rows.len(),
            "described CSV source"
        );
        Ok(columns)
    }
}

impl SchemaSource for CsvSchemaSource {
    fn describe(
        &self,
        data_source: &str,
        query: &str,
    ) -> std::result::Result<Vec<SourceColumn>, SchemaError> {
        let path = self.resolve(data_source, query)?;
        Ok(self.describe_file(&path)?)
    }
}
