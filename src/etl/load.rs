//! Loader trait for persisting tables

use crate::error::EtlResult;
use crate::table::Table;

/// Loader trait for loading a table into a destination
///
/// Returns the number of rows written.
pub trait Loader: Send + Sync {
    /// Destination identifier recorded in step logs
    fn target(&self) -> &str;

    /// Load the table into the destination
    ///
    /// # Errors
    /// Returns an error if loading fails (schema, store, configuration)
    fn load(&self, table: &Table) -> impl std::future::Future<Output = EtlResult<usize>> + Send;
}
