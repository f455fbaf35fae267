//! NDJSON (Newline Delimited JSON) step trail files
//!
//! A run's [`StepLogEntry`](crate::orchestrator::StepLogEntry) trail is
//! written one entry per line so it can be replayed or grepped later.

use eyre::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Read typed records from an NDJSON file
pub struct NdjsonReader {
    path: PathBuf,
}

impl NdjsonReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read every non-blank line
    pub fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.read_lines(usize::MAX)
    }

    /// Read at most `count` records from the start of the file
    pub fn read_lines<T: DeserializeOwned>(&self, count: usize) -> Result<Vec<T>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read NDJSON file: {}", self.path.display()))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(count)
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Failed to parse line {} of {}", i + 1, self.path.display())
                })
            })
            .collect()
    }
}

/// Write typed records to an NDJSON file
pub struct NdjsonWriter {
    path: PathBuf,
}

impl NdjsonWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with one line per record
    pub fn write<T: Serialize>(&self, items: &[T]) -> Result<usize> {
        let ndjson = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        // Add trailing newline
        let content = if ndjson.is_empty() {
            String::new()
        } else {
            format!("{}\n", ndjson)
        };

        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write NDJSON file: {}", self.path.display()))?;
        log::debug!("Wrote {} record(s) to {}", items.len(), self.path.display());

        Ok(items.len())
    }

    /// Append records, creating the file if needed
    pub fn append<T: Serialize>(&self, items: &[T]) -> Result<usize> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open NDJSON file: {}", self.path.display()))?;

        for item in items {
            writeln!(file, "{}", serde_json::to_string(item)?)?;
        }

        Ok(items.len())
    }
}
