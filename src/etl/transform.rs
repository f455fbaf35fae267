//! Transformer trait for table-to-table steps

use crate::error::EtlResult;
use crate::table::Table;
use crate::transform::Diagnostic;
use serde::Serialize;

/// Output of a transformer: the new table plus one diagnostic per step
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub table: Table,
    pub diagnostics: Vec<Diagnostic>,
}

/// Shape of a table before and after a whole transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub total_transformations: usize,
    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
}

impl Transformed {
    pub fn summary(&self) -> TransformSummary {
        let (rows_before, columns_before) = match self.diagnostics.first() {
            Some(first) => (first.rows_before, first.columns_before),
            None => (self.table.row_count(), self.table.column_count()),
        };
        TransformSummary {
            total_transformations: self.diagnostics.len(),
            rows_before,
            columns_before,
            rows_after: self.table.row_count(),
            columns_after: self.table.column_count(),
        }
    }

    /// Collected warnings across every step
    pub fn warnings(&self) -> Vec<&str> {
        self.diagnostics
            .iter()
            .flat_map(|d| d.warnings.iter().map(String::as_str))
            .collect()
    }
}

/// Transformer trait for transforming tables
///
/// Implementors must not mutate shared state: the same input always
/// yields the same output.
pub trait Transformer: Send + Sync {
    /// Transform a table
    ///
    /// # Errors
    /// Returns an error if a step cannot be applied (unknown columns in an
    /// aggregation, strict validation failures, etc.)
    fn transform(&self, input: Table) -> EtlResult<Transformed>;
}

/// Identity transformer that passes tables through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl IdentityTransformer {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for IdentityTransformer {
    fn transform(&self, input: Table) -> EtlResult<Transformed> {
        Ok(Transformed {
            table: input,
            diagnostics: Vec::new(),
        })
    }
}
