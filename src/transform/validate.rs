//! Data quality rules
//!
//! Validation never changes the table. It produces a per-column report in
//! the diagnostic details; failed checks are warnings unless the directive
//! is strict.

use super::Diagnostic;
use crate::error::{EtlError, EtlResult};
use crate::table::{Table, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub not_null: bool,
    /// Inclusive `[min, max]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<serde_json::Value>>,
}

impl ValidationRule {
    pub(super) fn check_config(&self, column: &str) -> EtlResult<()> {
        if let Some([min, max]) = self.range {
            if min > max {
                return Err(EtlError::Configuration(format!(
                    "validation range for '{}' has min {} greater than max {}",
                    column, min, max
                )));
            }
        }
        Ok(())
    }
}

pub(super) fn apply(
    input: &Table,
    rules: &IndexMap<String, ValidationRule>,
    strict: bool,
    diag: &mut Diagnostic,
) -> EtlResult<()> {
    let mut report = serde_json::Map::new();
    let mut failures = Vec::new();

    for (name, rule) in rules.iter() {
        let Some(column) = input.column(name) else {
            failures.push(format!("{}: column not found", name));
            continue;
        };
        let mut checks = serde_json::Map::new();

        if rule.not_null {
            let nulls = column.null_count();
            let percentage = column.missing_ratio() * 100.0;
            checks.insert(
                "null_check".into(),
                json!({"passed": nulls == 0, "null_count": nulls, "null_percentage": percentage}),
            );
            if nulls > 0 {
                failures.push(format!("{}: {} missing value(s)", name, nulls));
            }
        }

        if let Some([min, max]) = rule.range {
            let out_of_range = column
                .values()
                .iter()
                .filter_map(Value::as_f64)
                .filter(|v| *v < min || *v > max)
                .count();
            checks.insert(
                "range_check".into(),
                json!({"passed": out_of_range == 0, "out_of_range_count": out_of_range, "range": [min, max]}),
            );
            if out_of_range > 0 {
                failures.push(format!(
                    "{}: {} value(s) outside [{}, {}]",
                    name, out_of_range, min, max
                ));
            }
        }

        if let Some(allowed) = &rule.allowed_values {
            let allowed: Vec<Value> = allowed.iter().map(Value::from_json).collect();
            let mut invalid: Vec<&Value> = column
                .values()
                .iter()
                .filter(|v| !v.is_null() && !allowed.iter().any(|a| v.loosely_equals(a)))
                .collect();
            let invalid_count = invalid.len();
            invalid.sort_by(|a, b| a.total_cmp(b));
            invalid.dedup();
            checks.insert(
                "allowed_values_check".into(),
                json!({
                    "passed": invalid_count == 0,
                    "invalid_count": invalid_count,
                    "invalid_values": invalid.iter().map(|v| v.to_json()).collect::<Vec<_>>(),
                }),
            );
            if invalid_count > 0 {
                failures.push(format!(
                    "{}: {} value(s) not in allowed set",
                    name, invalid_count
                ));
            }
        }

        report.insert(name.to_string(), serde_json::Value::Object(checks));
    }

    diag.detail("validation", serde_json::Value::Object(report));
    if failures.is_empty() {
        return Ok(());
    }
    if strict {
        return Err(EtlError::Validation(failures.join("; ")));
    }
    for failure in failures {
        diag.warn(failure);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Directive, apply as apply_directive};

    fn people() -> Table {
        Table::from_rows(
            vec!["age".into(), "status".into()],
            vec![
                vec![Value::Integer(30), "active".into()],
                vec![Value::Integer(150), "active".into()],
                vec![Value::Null, "banned".into()],
            ],
        )
        .unwrap()
    }

    fn rules() -> IndexMap<String, ValidationRule> {
        [
            (
                "age".to_string(),
                ValidationRule {
                    not_null: true,
                    range: Some([0.0, 120.0]),
                    ..Default::default()
                },
            ),
            (
                "status".to_string(),
                ValidationRule {
                    allowed_values: Some(vec![json!("active"), json!("inactive")]),
                    ..Default::default()
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_lenient_validation_reports_and_keeps_table() {
        let directive = Directive::Validate {
            rules: rules(),
            strict: false,
        };
        let (out, diag) = apply_directive(&people(), &directive).unwrap();
        assert_eq!(out, people());
        assert_eq!(diag.warnings.len(), 3);
        let report = &diag.details["validation"];
        assert_eq!(report["age"]["null_check"]["null_count"], json!(1));
        assert_eq!(report["age"]["range_check"]["out_of_range_count"], json!(1));
        assert_eq!(
            report["status"]["allowed_values_check"]["invalid_values"],
            json!(["banned"])
        );
    }

    #[test]
    fn test_strict_validation_fails() {
        let directive = Directive::Validate {
            rules: rules(),
            strict: true,
        };
        let result = apply_directive(&people(), &directive);
        assert!(matches!(result, Err(EtlError::Validation(_))));
    }

    #[test]
    fn test_passing_rules_have_no_warnings() {
        let directive = Directive::Validate {
            rules: [(
                "status".to_string(),
                ValidationRule {
                    not_null: true,
                    ..Default::default()
                },
            )]
            .into_iter()
            .collect(),
            strict: true,
        };
        let (_, diag) = apply_directive(&people(), &directive).unwrap();
        assert!(diag.warnings.is_empty());
    }
}
