//! Delimited file extraction

use super::with_lineage;
use crate::error::{EtlError, EtlResult};
use crate::etl::Extractor;
use crate::table::{Column, DataType, Table, Value};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Lineage column naming the file a row came from
pub const SOURCE_FILE_COLUMN: &str = "source_file";

/// Reads one or more delimited files into a single table
///
/// Every row is tagged with its file's base name and the time the file was
/// read. Missing or unreadable files are skipped with a warning.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    paths: Vec<PathBuf>,
    delimiter: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Summary of a delimited file, as reported by [`FileExtractor::inspect`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProfile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub sample: Vec<Vec<serde_json::Value>>,
}

impl FileExtractor {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            delimiter: b',',
        }
    }

    /// Use a different single-byte field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Read one file without lineage columns
    ///
    /// # Errors
    /// `NotFound` if the path does not exist, `Csv` for malformed input and
    /// `Schema` for structurally invalid tables
    pub fn read_file(&self, path: &Path) -> EtlResult<Table> {
        if !path.exists() {
            return Err(EtlError::NotFound(path.display().to_string()));
        }
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_path(path)?;

        let headers = unique_headers(reader.headers()?.iter());
        let width = headers.len();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }
        log::debug!(
            "Read {} rows, {} columns from {}",
            rows.len(),
            width,
            path.display()
        );

        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let dtype = rows
                    .iter()
                    .filter_map(|row| Value::parse_inferred(&row[i]).data_type())
                    .reduce(DataType::unify)
                    .unwrap_or(DataType::Text);
                let values = rows
                    .iter()
                    .map(|row| Value::parse_typed(&row[i], dtype))
                    .collect();
                Column::new(name, dtype, values)
            })
            .collect();
        Table::from_columns(columns)
    }

    /// Profile a file: size, shape, inferred column types and sample rows
    pub fn inspect(&self, path: &Path) -> EtlResult<FileProfile> {
        let size_bytes = std::fs::metadata(path)
            .map_err(|_| EtlError::NotFound(path.display().to_string()))?
            .len();
        let table = self.read_file(path)?;
        Ok(FileProfile {
            path: path.to_path_buf(),
            size_bytes,
            row_count: table.row_count(),
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnProfile {
                    name: c.name().to_string(),
                    dtype: c.dtype().to_string(),
                    null_count: c.null_count(),
                })
                .collect(),
            sample: table
                .slice(0, 5)
                .rows()
                .into_iter()
                .map(|row| row.iter().map(Value::to_json).collect())
                .collect(),
        })
    }
}

impl Extractor for FileExtractor {
    fn source(&self) -> String {
        self.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn extract(&self) -> EtlResult<Table> {
        let mut tables = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            log::info!("Extracting data from {}", path.display());
            let table = match self.read_file(path) {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            tables.push(with_lineage(table, SOURCE_FILE_COLUMN, &name)?);
        }

        if tables.is_empty() {
            return Err(EtlError::NoData(format!(
                "none of the files could be read: {}",
                self.source()
            )));
        }
        let combined = Table::concat(tables);
        if combined.is_empty() {
            return Err(EtlError::NoData(format!(
                "files contain no data rows: {}",
                self.source()
            )));
        }
        log::info!(
            "Extracted {} rows from {} file(s)",
            combined.row_count(),
            self.paths.len()
        );
        Ok(combined)
    }
}

/// Blank headers become `column_<i>`, repeats get a `.1`, `.2` suffix
fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.enumerate()
        .map(|(i, name)| {
            let base = match name.trim() {
                "" => format!("column_{}", i),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}
