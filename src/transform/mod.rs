//! Table transformation directives
//!
//! A pipeline definition lists [`Directive`]s; [`DirectiveTransformer`]
//! applies them in order, each on the previous output, and records one
//! [`Diagnostic`] per directive. Inputs are never modified in place.

mod aggregate;
mod clean;
mod derive;
mod expr;
mod filter;
mod rename;
mod retype;
mod validate;

pub use aggregate::Reduction;
pub use clean::{CleanSpec, MissingPolicy};
pub use derive::Feature;
pub use expr::{BinaryOp, Expr, ExprError};
pub use filter::Condition;
pub use rename::NamingConvention;
pub use validate::ValidationRule;

use crate::error::{EtlError, EtlResult};
use crate::etl::{Transformed, Transformer};
use crate::table::{DataType, Table};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One transformation step, tagged by `op` in pipeline files
///
/// # Example
/// ```
/// use etl_orchestrator::transform::Directive;
///
/// let yaml = "op: filter\nconditions:\n  amount:\n    min: 0\n";
/// let directive: Directive = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(directive.name(), "filter");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Directive {
    Clean(CleanSpec),
    Rename {
        #[serde(default)]
        convention: NamingConvention,
    },
    Retype {
        columns: IndexMap<String, DataType>,
    },
    Filter {
        conditions: IndexMap<String, Condition>,
    },
    Derive {
        features: Vec<Feature>,
    },
    Aggregate {
        group_by: Vec<String>,
        aggregations: IndexMap<String, Vec<Reduction>>,
    },
    Validate {
        rules: IndexMap<String, ValidationRule>,
        #[serde(default)]
        strict: bool,
    },
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clean(_) => "clean",
            Self::Rename { .. } => "rename",
            Self::Retype { .. } => "retype",
            Self::Filter { .. } => "filter",
            Self::Derive { .. } => "derive",
            Self::Aggregate { .. } => "aggregate",
            Self::Validate { .. } => "validate",
        }
    }

    /// Reject self-contradictory parameters before any data is touched
    pub fn validate(&self) -> EtlResult<()> {
        match self {
            Self::Clean(spec) => spec.validate(),
            Self::Filter { conditions } => {
                for (column, condition) in conditions.iter() {
                    condition.validate(column)?;
                }
                Ok(())
            }
            Self::Derive { features } => {
                for feature in features {
                    feature.validate()?;
                }
                Ok(())
            }
            Self::Aggregate {
                group_by,
                aggregations,
            } => {
                if group_by.is_empty() {
                    return Err(EtlError::Configuration(
                        "aggregate requires at least one group_by column".to_string(),
                    ));
                }
                if aggregations.is_empty() {
                    return Err(EtlError::Configuration(
                        "aggregate requires at least one aggregation".to_string(),
                    ));
                }
                if let Some((column, _)) = aggregations.iter().find(|(_, r)| r.is_empty()) {
                    return Err(EtlError::Configuration(format!(
                        "aggregation for '{}' lists no reductions",
                        column
                    )));
                }
                Ok(())
            }
            Self::Validate { rules, .. } => {
                for (column, rule) in rules.iter() {
                    rule.check_config(column)?;
                }
                Ok(())
            }
            Self::Rename { .. } | Self::Retype { .. } => Ok(()),
        }
    }
}

/// Outcome record of one directive application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub operation: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Diagnostic {
    fn start(operation: &str, input: &Table) -> Self {
        Self {
            operation: operation.to_string(),
            rows_before: input.row_count(),
            rows_after: input.row_count(),
            columns_before: input.column_count(),
            columns_after: input.column_count(),
            warnings: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    fn finish(&mut self, output: &Table) {
        self.rows_after = output.row_count();
        self.columns_after = output.column_count();
    }

    /// Record a recoverable problem and log it
    pub(crate) fn warn(&mut self, message: String) {
        log::warn!("{}: {}", self.operation, message);
        self.warnings.push(message);
    }

    pub(crate) fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }
}

/// Apply a single directive to a table
///
/// # Errors
/// Fails when the directive cannot be applied at all (unknown aggregate
/// columns, strict validation failures, invalid parameters). Column-level
/// problems are downgraded to warnings on the diagnostic.
pub fn apply(input: &Table, directive: &Directive) -> EtlResult<(Table, Diagnostic)> {
    directive.validate()?;
    let mut diag = Diagnostic::start(directive.name(), input);
    let output = match directive {
        Directive::Clean(spec) => clean::apply(input, spec, &mut diag)?,
        Directive::Rename { convention } => rename::apply(input, *convention, &mut diag)?,
        Directive::Retype { columns } => retype::apply(input, columns, &mut diag)?,
        Directive::Filter { conditions } => filter::apply(input, conditions),
        Directive::Derive { features } => derive::apply(input, features, &mut diag)?,
        Directive::Aggregate {
            group_by,
            aggregations,
        } => aggregate::apply(input, group_by, aggregations)?,
        Directive::Validate { rules, strict } => {
            validate::apply(input, rules, *strict, &mut diag)?;
            input.clone()
        }
    };
    diag.finish(&output);
    log::info!(
        "Transformation: {} - ({}, {}) -> ({}, {})",
        diag.operation,
        diag.rows_before,
        diag.columns_before,
        diag.rows_after,
        diag.columns_after
    );
    Ok((output, diag))
}

/// Apply directives in order; an empty list returns the input unchanged
pub fn transform(input: Table, directives: &[Directive]) -> EtlResult<Transformed> {
    let mut table = input;
    let mut diagnostics = Vec::with_capacity(directives.len());
    for directive in directives {
        let (next, diag) = apply(&table, directive)?;
        table = next;
        diagnostics.push(diag);
    }
    Ok(Transformed { table, diagnostics })
}

/// [`Transformer`] over an ordered directive list
#[derive(Debug, Clone, Default)]
pub struct DirectiveTransformer<'a> {
    directives: &'a [Directive],
}

impl<'a> DirectiveTransformer<'a> {
    pub fn new(directives: &'a [Directive]) -> Self {
        Self { directives }
    }
}

impl Transformer for DirectiveTransformer<'_> {
    fn transform(&self, input: Table) -> EtlResult<Transformed> {
        transform(input, self.directives)
    }
}
