//! Column name normalisation

use super::Diagnostic;
use crate::error::EtlResult;
use crate::table::Table;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static pattern"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    #[serde(alias = "lowercase")]
    Lower,
    #[serde(alias = "uppercase")]
    Upper,
    /// Non-identifier characters become `_`, lowercased, `_` trimmed
    #[default]
    #[serde(alias = "snake")]
    SnakeCase,
}

impl NamingConvention {
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Lower => name.trim().to_lowercase(),
            Self::Upper => name.trim().to_uppercase(),
            Self::SnakeCase => NON_IDENTIFIER
                .replace_all(name, "_")
                .to_lowercase()
                .trim_matches('_')
                .to_string(),
        }
    }
}

pub(super) fn apply(
    input: &Table,
    convention: NamingConvention,
    diag: &mut Diagnostic,
) -> EtlResult<Table> {
    let mut taken = HashSet::new();
    let mut output = Table::new();
    for (index, column) in input.columns().iter().enumerate() {
        let mut renamed = convention.apply(column.name());
        if renamed.is_empty() {
            renamed = format!("column_{}", index);
        }
        if !taken.insert(renamed.clone()) {
            diag.warn(format!(
                "column '{}' renames to '{}' which is already taken; dropped",
                column.name(),
                renamed
            ));
            continue;
        }
        output.add_column(column.clone().with_name(renamed))?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};

    fn table_with(names: &[&str]) -> Table {
        Table::from_columns(
            names
                .iter()
                .map(|n| Column::from_values(*n, vec![Value::Integer(1)]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(NamingConvention::SnakeCase.apply("Join Date"), "join_date");
        assert_eq!(NamingConvention::SnakeCase.apply(" Total($) "), "total");
        assert_eq!(NamingConvention::SnakeCase.apply("user.tier"), "user_tier");
        assert_eq!(NamingConvention::SnakeCase.apply("Already_ok"), "already_ok");
    }

    #[test]
    fn test_upper_and_lower() {
        assert_eq!(NamingConvention::Upper.apply(" name "), "NAME");
        assert_eq!(NamingConvention::Lower.apply("NaMe"), "name");
    }

    #[test]
    fn test_collision_keeps_first_column() {
        let mut diag = Diagnostic::start("rename", &Table::new());
        let out = apply(
            &table_with(&["First Name", "first_name", "Age"]),
            NamingConvention::SnakeCase,
            &mut diag,
        )
        .unwrap();
        assert_eq!(out.column_names(), vec!["first_name", "age"]);
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn test_empty_result_gets_positional_name() {
        let mut diag = Diagnostic::start("rename", &Table::new());
        let out = apply(&table_with(&["id", "$$"]), NamingConvention::SnakeCase, &mut diag).unwrap();
        assert_eq!(out.column_names(), vec!["id", "column_1"]);
    }
}
