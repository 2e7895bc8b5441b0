use std::{error::Error, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single result row keyed by column alias.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    InvalidOperator(String),
    InvalidDate { field: String, value: String },
    TooManyParameters { count: usize, max: usize },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperator(operator) => write!(f, "unsupported filter operator: {operator}"),
            Self::InvalidDate { field, value } => {
                write!(f, "invalid date for {field}: {value} (expected YYYY-MM-DD)")
            }
            Self::TooManyParameters { count, max } => {
                write!(f, "query needs {count} parameters, SQL Server accepts at most {max}")
            }
        }
    }
}

impl Error for FilterError {}

/// Comparison operator applied to date filters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOperator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>", alias = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl FilterOperator {
    pub const ALL: [Self; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Le, Self::Gt, Self::Ge];

    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for FilterOperator {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "=" | "==" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(FilterError::InvalidOperator(other.to_string())),
        }
    }
}

/// Caller-supplied filter on an allow-listed search field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrQueryFilter {
    pub name: String,
    #[serde(default)]
    pub operator: FilterOperator,
    pub value: String,
}

impl BrQueryFilter {
    pub fn new(name: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Positional parameter bound to an `@Pn` placeholder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum QueryParam {
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl QueryParam {
    /// Parses a `YYYY-MM-DD` filter value.
    ///
    /// # Errors
    /// Returns `FilterError::InvalidDate` if the value is not a calendar date.
    pub fn date(field: &str, value: &str) -> Result<Self, FilterError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self::Date)
            .map_err(|_| FilterError::InvalidDate {
                field: field.to_string(),
                value: value.to_string(),
            })
    }

    /// Wraps a value for a substring `LIKE` match.
    ///
    /// Pattern metacharacters are escaped with `\`, so the predicate must
    /// carry `ESCAPE '\'`.
    #[must_use]
    pub fn contains(value: &str) -> Self {
        let mut pattern = String::with_capacity(value.len() + 2);
        pattern.push('%');
        for ch in value.chars() {
            if matches!(ch, '\\' | '%' | '_' | '[') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        Self::Text(pattern)
    }
}

/// Request details echoed alongside a result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrQueryMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub br_numbers: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<BrQueryFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub active: bool,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Rows returned by a BR search plus the window total.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrQueryResult {
    pub br: Vec<Row>,
    pub metadata: BrQueryMetadata,
    #[serde(rename = "TotalCount")]
    pub total_count: i64,
}
