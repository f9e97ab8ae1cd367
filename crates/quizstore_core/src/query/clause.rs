//! Clause types accumulated by `QueryBuilder` and their SQL rendering.

use super::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::str::FromStr;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

// Projections and HAVING targets: a column, `*`, `table.*`, or one function
// call over a column or `*`, each with an optional `AS alias`.
static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?:[A-Za-z_][A-Za-z0-9_]*\.)?\*",
        r"|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?",
        r"|[A-Za-z_][A-Za-z0-9_]*\(\s*(?:(?i:DISTINCT)\s+)?",
        r"(?:\*|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)\s*\)",
        r")(?:\s+(?i:AS)\s+[A-Za-z_][A-Za-z0-9_]*)?$",
    ))
    .expect("valid regex")
});

/// Comparison operator of one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Gt | Self::Lt | Self::Gte | Self::Lte
        )
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::NotEq),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Gte),
            "<=" => Ok(Self::Lte),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "IS NULL" => Ok(Self::IsNull),
            "IS NOT NULL" => Ok(Self::IsNotNull),
            _ => Err(QueryError::InvalidOperator(value.to_string())),
        }
    }
}

/// Connective placed before a condition. Ignored for the first condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boolean {
    #[default]
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(QueryError::InvalidOperator(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
        }
    }
}

/// One WHERE/HAVING predicate.
///
/// `values` holds zero values for NULL checks, one for comparisons and any
/// number for IN/NOT IN.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub values: Vec<Value>,
    pub boolean: Boolean,
}

impl Condition {
    pub fn new(
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
        boolean: Boolean,
    ) -> Self {
        let values = match operator {
            Operator::IsNull | Operator::IsNotNull => Vec::new(),
            _ => vec![value.into()],
        };
        Self {
            column: column.into(),
            operator,
            values,
            boolean,
        }
    }

    pub fn list<I, V>(column: impl Into<String>, operator: Operator, values: I, boolean: Boolean) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            column: column.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            boolean,
        }
    }

    fn render(&self, allow_expression: bool, binds: &mut Vec<Value>) -> QueryResult<String> {
        if allow_expression {
            check_expression(&self.column)?;
        } else {
            check_identifier(&self.column)?;
        }
        let column = self.column.as_str();

        let sql = match self.operator {
            Operator::IsNull | Operator::IsNotNull => {
                format!("{column} {}", self.operator.as_sql())
            }
            Operator::In | Operator::NotIn if self.values.is_empty() => {
                // Nothing is IN an empty set; everything is NOT IN it.
                if self.operator == Operator::In {
                    "0 = 1".to_string()
                } else {
                    "1 = 1".to_string()
                }
            }
            Operator::In | Operator::NotIn => {
                let placeholders = vec!["?"; self.values.len()].join(", ");
                binds.extend(self.values.iter().cloned());
                format!("{column} {} ({placeholders})", self.operator.as_sql())
            }
            operator => {
                binds.push(self.values.first().cloned().unwrap_or(Value::Null));
                format!("{column} {} ?", operator.as_sql())
            }
        };
        Ok(sql)
    }
}

/// Renders `cond1 [BOOLEAN cond2 ...]`, left to right with no grouping.
pub(super) fn render_conditions(
    conditions: &[Condition],
    allow_expression: bool,
    binds: &mut Vec<Value>,
) -> QueryResult<String> {
    let mut sql = String::new();
    for (index, condition) in conditions.iter().enumerate() {
        if index > 0 {
            sql.push(' ');
            sql.push_str(condition.boolean.as_sql());
            sql.push(' ');
        }
        sql.push_str(&condition.render(allow_expression, binds)?);
    }
    Ok(sql)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub left: String,
    pub operator: Operator,
    pub right: String,
    pub kind: JoinType,
}

impl Join {
    pub(super) fn render(&self) -> QueryResult<String> {
        check_identifier(&self.table)?;
        check_identifier(&self.left)?;
        check_identifier(&self.right)?;
        if !self.operator.is_comparison() {
            return Err(QueryError::InvalidOperator(
                self.operator.as_sql().to_string(),
            ));
        }
        Ok(format!(
            "{} JOIN {} ON {} {} {}",
            self.kind.as_sql(),
            self.table,
            self.left,
            self.operator.as_sql(),
            self.right
        ))
    }
}

pub(super) fn check_identifier(value: &str) -> QueryResult<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(value.to_string()))
    }
}

pub(super) fn check_expression(value: &str) -> QueryResult<()> {
    if EXPRESSION.is_match(value) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(value.to_string()))
    }
}
