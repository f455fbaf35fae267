//! Extractor trait for pulling tables out of sources

use crate::error::EtlResult;
use crate::table::Table;

/// Extractor trait for extracting a table from a source
///
/// Implementors define how to read rows from sources like:
/// - Delimited files
/// - Paginated HTTP APIs
///
/// # Example
/// ```no_run
/// use etl_orchestrator::error::EtlResult;
/// use etl_orchestrator::etl::Extractor;
/// use etl_orchestrator::table::{Table, Value};
///
/// struct StaticExtractor;
///
/// impl Extractor for StaticExtractor {
///     fn source(&self) -> String {
///         "static".to_string()
///     }
///
///     async fn extract(&self) -> EtlResult<Table> {
///         Table::from_rows(vec!["id".into()], vec![vec![Value::Integer(1)]])
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// Human-readable source identifier recorded in step logs
    fn source(&self) -> String;

    /// Extract a table from the source
    ///
    /// # Errors
    /// Returns an error if extraction fails (missing files, network, parsing)
    /// or produced no rows at all
    fn extract(&self) -> impl std::future::Future<Output = EtlResult<Table>> + Send;
}
