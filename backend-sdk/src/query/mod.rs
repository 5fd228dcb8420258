//! Filter predicates and their encoding into backend query syntax
//!
//! A `FilterPredicate` tree is translated by `encode` into the native query
//! string of one `Dialect`. Encoding is a pure function of the tree and the
//! dialect, serialises children strictly left-to-right in input order, and
//! maps an empty tree to the empty string.

mod encoder;

pub use encoder::{encode, encode_order};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Backend query syntaxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// ServiceNow encoded query (`sysparm_query`)
    ServiceNow,
    /// Lucene syntax for Elasticsearch `query_string`
    Lucene,
    /// GitHub search qualifiers
    GitHubSearch,
}

impl Dialect {
    /// Marker placed before a field to request descending order
    pub fn descending_marker(self) -> char {
        match self {
            Dialect::ServiceNow => '^',
            Dialect::Lucene | Dialect::GitHubSearch => '-',
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::ServiceNow => write!(f, "servicenow"),
            Dialect::Lucene => write!(f, "lucene"),
            Dialect::GitHubSearch => write!(f, "github"),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

/// Scalar value compared against a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Integer(i) => write!(f, "{}", i),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(i64::from(value))
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Integer(i64::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

/// A boolean filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPredicate {
    Condition {
        field: String,
        operator: Operator,
        value: FilterValue,
    },
    And(Vec<FilterPredicate>),
    Or(Vec<FilterPredicate>),
    Not(Box<FilterPredicate>),
}

impl Default for FilterPredicate {
    fn default() -> Self {
        Self::empty()
    }
}

impl FilterPredicate {
    /// The empty tree: no filter
    pub fn empty() -> Self {
        FilterPredicate::And(Vec::new())
    }

    pub fn condition(field: impl Into<String>, operator: Operator, value: impl Into<FilterValue>) -> Self {
        FilterPredicate::Condition {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Equals, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::NotEquals, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::condition(field, Operator::Contains, value)
    }

    pub fn and(children: Vec<FilterPredicate>) -> Self {
        FilterPredicate::And(children)
    }

    pub fn or(children: Vec<FilterPredicate>) -> Self {
        FilterPredicate::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterPredicate) -> Self {
        FilterPredicate::Not(Box::new(child))
    }

    /// True when the tree contains no condition at all
    pub fn is_empty(&self) -> bool {
        match self {
            FilterPredicate::Condition { .. } => false,
            FilterPredicate::And(children) | FilterPredicate::Or(children) => {
                children.iter().all(FilterPredicate::is_empty)
            }
            FilterPredicate::Not(child) => child.is_empty(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Ordering directive for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Reject field names containing anything a dialect could interpret
///
/// Allowed: ASCII letters, digits, `_` and `.` (nested/dot-walked fields),
/// with an optional leading `@` for Elasticsearch metadata fields.
pub fn validate_field(field: &str) -> Result<()> {
    let name = field.strip_prefix('@').unwrap_or(field);
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::validation(format!("Invalid field name '{}'", field)))
    }
}
