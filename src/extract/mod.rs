//! Source extractors
//!
//! [`SourceSpec`] is the serialisable description of where a job reads
//! from; [`SourceExtractor`] is the matching [`Extractor`].

mod file;
mod remote;

pub use file::{ColumnProfile, FileExtractor, FileProfile, SOURCE_FILE_COLUMN};
pub use remote::{ApiExtractor, Pagination, SOURCE_ENDPOINT_COLUMN};

use crate::client::ApiClient;
use crate::error::{EtlError, EtlResult};
use crate::etl::Extractor;
use crate::table::{Column, DataType, Table, Value};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lineage column holding the time rows were extracted
pub const EXTRACTION_TIMESTAMP_COLUMN: &str = "extraction_timestamp";

fn default_delimiter() -> char {
    ','
}

/// Where a job reads its rows from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Delimited flat files, concatenated in order
    #[serde(alias = "csv")]
    File {
        paths: Vec<PathBuf>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    /// A JSON endpoint of the configured API
    #[serde(alias = "api")]
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        params: IndexMap<String, serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pagination: Option<Pagination>,
    },
}

impl SourceSpec {
    /// Check the source description without touching files or the network
    pub fn validate(&self, has_client: bool) -> EtlResult<()> {
        match self {
            Self::File { paths, delimiter } => {
                if paths.is_empty() {
                    return Err(EtlError::Configuration(
                        "file source needs at least one path".to_string(),
                    ));
                }
                if !delimiter.is_ascii() {
                    return Err(EtlError::Configuration(format!(
                        "delimiter {:?} is not a single-byte character",
                        delimiter
                    )));
                }
                Ok(())
            }
            Self::Remote {
                endpoint,
                pagination,
                ..
            } => {
                if endpoint.trim().is_empty() {
                    return Err(EtlError::Configuration(
                        "remote source needs an endpoint".to_string(),
                    ));
                }
                if !has_client {
                    return Err(EtlError::Configuration(format!(
                        "remote source '{}' needs API_BASE_URL to be configured",
                        endpoint
                    )));
                }
                if let Some(p) = pagination {
                    if p.page_size == 0 || p.max_pages == Some(0) {
                        return Err(EtlError::Configuration(format!(
                            "pagination for '{}' needs a positive page size and page cap",
                            endpoint
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Extractor for any [`SourceSpec`]
#[derive(Debug, Clone)]
pub enum SourceExtractor<'a> {
    File(FileExtractor),
    Remote(ApiExtractor<'a>),
}

impl<'a> SourceExtractor<'a> {
    /// Build the extractor for a source
    ///
    /// # Errors
    /// Returns a `Configuration` error for invalid sources, including
    /// remote sources without a client
    pub fn from_spec(spec: &SourceSpec, client: Option<&'a ApiClient>) -> EtlResult<Self> {
        spec.validate(client.is_some())?;
        match (spec, client) {
            (SourceSpec::File { paths, delimiter }, _) => Ok(Self::File(
                FileExtractor::new(paths.clone()).with_delimiter(*delimiter as u8),
            )),
            (
                SourceSpec::Remote {
                    endpoint,
                    params,
                    data_key,
                    pagination,
                },
                Some(client),
            ) => Ok(Self::Remote(
                ApiExtractor::new(client, endpoint.clone())
                    .with_params(params.iter().map(|(k, v)| (k.to_string(), param_text(v))).collect())
                    .with_data_key(data_key.clone())
                    .with_pagination(pagination.clone()),
            )),
            (SourceSpec::Remote { endpoint, .. }, None) => Err(EtlError::Configuration(format!(
                "remote source '{}' has no client",
                endpoint
            ))),
        }
    }
}

impl Extractor for SourceExtractor<'_> {
    fn source(&self) -> String {
        match self {
            Self::File(extractor) => extractor.source(),
            Self::Remote(extractor) => extractor.source(),
        }
    }

    async fn extract(&self) -> EtlResult<Table> {
        match self {
            Self::File(extractor) => extractor.extract().await,
            Self::Remote(extractor) => extractor.extract().await,
        }
    }
}

/// Query parameter text: strings unquoted, everything else as JSON
fn param_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tag every row with a source identifier and the extraction time
pub(crate) fn with_lineage(mut table: Table, source_column: &str, source: &str) -> EtlResult<Table> {
    let rows = table.row_count();
    let now = Utc::now().naive_utc();
    table.set_column(Column::new(
        source_column,
        DataType::Text,
        vec![Value::from(source); rows],
    ))?;
    table.set_column(Column::new(
        EXTRACTION_TIMESTAMP_COLUMN,
        DataType::Timestamp,
        vec![Value::Timestamp(now); rows],
    ))?;
    Ok(table)
}
