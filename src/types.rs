//! ### 修改记录 (2026-03-04)
//! - 原因: 需要统一复制链路的数据模型
//! - 目的: 为 Coordinator / Queue / Worker 提供共享的目标、参数与行结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A replication destination.
///
/// `Local` is written synchronously whenever any remote write succeeds and is
/// never named by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    Primary,
    Secondary,
    Local,
}

impl Target {
    /// Remote targets in write/read priority order.
    pub const REMOTES: [Target; 2] = [Target::Primary, Target::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Secondary => "secondary",
            Target::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Target::Primary),
            "secondary" => Some(Target::Secondary),
            "local" => Some(Target::Local),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Target::Local)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a logical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// Infers the kind from the leading keyword of a statement.
    ///
    /// `REPLACE` and unknown statements count as inserts since they may create rows.
    pub fn from_query(query: &str) -> Self {
        let head = query
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match head.as_str() {
            "UPDATE" => OpKind::Update,
            "DELETE" => OpKind::Delete,
            _ => OpKind::Insert,
        }
    }

    pub fn wants_generated_id(&self) -> bool {
        matches!(self, OpKind::Insert)
    }
}

/// A single bound value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Parameter set of a statement.
///
/// Positional values bind to `%s` placeholders, named values to `%(name)s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Params {
    Positional(Vec<SqlValue>),
    Named(BTreeMap<String, SqlValue>),
}

impl Params {
    pub fn empty() -> Self {
        Params::Positional(Vec::new())
    }

    pub fn named<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<SqlValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of a named parameter set; empty for positional ones.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Params::Positional(_) => Vec::new(),
            Params::Named(values) => values.keys().map(String::as_str).collect(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::empty()
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Params::Positional(values)
    }
}

/// Builds positional [`Params`] from a list of expressions convertible to [`SqlValue`].
#[macro_export]
macro_rules! sql_params {
    () => {
        $crate::types::Params::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::types::Params::Positional(vec![$($crate::types::SqlValue::from($value)),+])
    };
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// One result row, columns kept in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) => Some(*v as i64),
            SqlValue::Text(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}
