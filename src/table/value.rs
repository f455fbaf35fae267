//! Cell values and semantic column types

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Rendering format for timestamps in text, CSV and the store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Semantic type shared by every cell of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[serde(alias = "int", alias = "int64")]
    Integer,
    #[serde(alias = "float64", alias = "double")]
    Float,
    #[serde(alias = "str", alias = "string")]
    Text,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "datetime")]
    Timestamp,
    #[serde(alias = "category")]
    Categorical,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Text-like columns hold strings (text and categorical)
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::Categorical)
    }

    /// Common type for two columns being merged
    pub fn unify(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Categorical => "categorical",
        };
        f.write_str(name)
    }
}

/// A single cell
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// The natural type of this cell, `None` for missing values
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(f) if f.is_nan() => None,
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Parse a raw text cell the way delimited files are read: integer,
    /// then float, then boolean, falling back to text. Empty cells are null.
    pub fn parse_inferred(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Self::Boolean(true),
            "false" => Self::Boolean(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Parse a raw text cell into a type already chosen for its column.
    /// Text-like columns keep the cell exactly as written.
    pub fn parse_typed(raw: &str, dtype: DataType) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        let parsed = match dtype {
            DataType::Integer => trimmed.parse::<i64>().ok().map(Self::Integer),
            DataType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Self::Float),
            DataType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            DataType::Text | DataType::Categorical | DataType::Timestamp => None,
        };
        parsed.unwrap_or_else(|| Self::Text(raw.to_string()))
    }

    /// Convert a JSON scalar into a cell. Arrays and objects are kept as
    /// their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Timestamp(ts) => {
                serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
        }
    }

    /// Total order used for sorting groups and categories.
    ///
    /// Missing values sort first, then booleans, numbers (compared across
    /// integer and float), timestamps and text.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Float(f) if f.is_nan() => 0,
                Value::Boolean(_) => 1,
                Value::Integer(_) | Value::Float(_) => 2,
                Value::Timestamp(_) => 3,
                Value::Text(_) => 4,
            }
        }

        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => rank(a).cmp(&rank(b)),
            },
        }
    }

    /// Loose comparison for filter bounds: numbers numerically, timestamps
    /// chronologically (text bounds are parsed), text lexically.
    pub fn compare_loose(&self, bound: &Value) -> Option<Ordering> {
        if self.is_null() || bound.is_null() {
            return None;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), bound.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, bound) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Text(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality used by allow/deny lists: numbers compare across integer
    /// and float, everything else must match exactly.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Self::Timestamp(a), Self::Text(b)) | (Self::Text(b), Self::Timestamp(a)) => {
                    parse_timestamp(b) == Some(*a)
                }
                _ => self == other,
            },
        }
    }
}

fn float_key(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_key(*a) == float_key(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Integer(i) => i.hash(state),
            Self::Float(f) => float_key(*f).hash(state),
            Self::Text(s) => s.hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::Timestamp(ts) => ts.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse the timestamp spellings accepted by `retype` and date features
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inferred() {
        assert_eq!(Value::parse_inferred("42"), Value::Integer(42));
        assert_eq!(Value::parse_inferred("4.5"), Value::Float(4.5));
        assert_eq!(Value::parse_inferred("TRUE"), Value::Boolean(true));
        assert_eq!(Value::parse_inferred(""), Value::Null);
        assert_eq!(Value::parse_inferred("  "), Value::Null);
        assert_eq!(Value::parse_inferred("Alice"), Value::Text("Alice".into()));
    }

    #[test]
    fn test_parse_typed_keeps_text_spelling() {
        assert_eq!(Value::parse_typed("007", DataType::Text), Value::from("007"));
        assert_eq!(Value::parse_typed("1.50", DataType::Categorical), Value::from("1.50"));
        assert_eq!(Value::parse_typed("7", DataType::Float), Value::Float(7.0));
        assert_eq!(Value::parse_typed(" False ", DataType::Boolean), Value::Boolean(false));
        assert_eq!(Value::parse_typed("", DataType::Text), Value::Null);
    }

    #[test]
    fn test_float_equality_and_hash_agree() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Value::Float(0.0));
        set.insert(Value::Float(-0.0));
        set.insert(Value::Float(f64::NAN));
        set.insert(Value::Float(f64::NAN));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_nan_is_missing() {
        assert!(Value::Float(f64::NAN).is_null());
        assert_eq!(Value::Float(f64::NAN).data_type(), None);
    }

    #[test]
    fn test_total_cmp_across_numbers() {
        assert_eq!(
            Value::Integer(2).total_cmp(&Value::Float(1.5)),
            Ordering::Greater
        );
        assert_eq!(Value::Null.total_cmp(&Value::Integer(0)), Ordering::Less);
        assert_eq!(
            Value::Text("a".into()).total_cmp(&Value::Integer(100)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_loose_timestamp_against_text() {
        let ts = parse_timestamp("2024-03-01").unwrap();
        let cell = Value::Timestamp(ts);
        assert_eq!(
            cell.compare_loose(&Value::Text("2024-01-01".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(cell.compare_loose(&Value::Null), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15T10:30:00Z").is_some());
        assert!(parse_timestamp("2024-01-15 10:30:00").is_some());
        assert!(parse_timestamp("2024-01-15T10:30:00.250").is_some());
        assert!(parse_timestamp("01/15/2024").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_timestamp_display() {
        let ts = parse_timestamp("2024-01-15 10:30:00").unwrap();
        assert_eq!(Value::Timestamp(ts).to_string(), "2024-01-15 10:30:00");
    }

    #[test]
    fn test_data_type_aliases() {
        let dt: DataType = serde_json::from_str("\"datetime\"").unwrap();
        assert_eq!(dt, DataType::Timestamp);
        let dt: DataType = serde_json::from_str("\"category\"").unwrap();
        assert_eq!(dt, DataType::Categorical);
        assert_eq!(DataType::Integer.unify(DataType::Float), DataType::Float);
        assert_eq!(DataType::Integer.unify(DataType::Text), DataType::Text);
    }
}
