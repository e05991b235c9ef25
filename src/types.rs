use crate::error::PipelineError;
use geo::Point;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A single cell after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Missing,
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Label form used for grouping, filtering and option lists.
    /// Whole numbers print without a fractional part so a numeric `Year`
    /// column groups as "2019" rather than "2019.0".
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Missing => None,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns.iter().position(|c| c.name == name)
    }

    /// Case-insensitive lookup, for datasets whose header casing varies between sources.
    pub fn find_ignore_case(&self, name: &str) -> Option<&Column> {
        let name = name.trim();
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.index_of(name).map(|i| self.columns[i].kind)
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns_of(ColumnKind::Categorical)
    }

    fn columns_of(&self, kind: ColumnKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&Value::Missing)
    }
}

/// Stable identifier of a dataset source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKey {
    File(PathBuf),
    Table(String),
    /// Built in memory from other datasets; never fetched.
    Derived(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::File(path) => write!(f, "file:{}", path.display()),
            SourceKey::Table(name) => write!(f, "table:{name}"),
            SourceKey::Derived(name) => write!(f, "derived:{name}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    key: SourceKey,
    schema: Schema,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(key: SourceKey, schema: Schema, records: Vec<Record>) -> Self {
        debug_assert!(records.iter().all(|r| r.values().len() == schema.len()));
        Self {
            key,
            schema,
            records,
        }
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> Vec<&Record> {
        self.records.iter().collect()
    }

    pub fn column_index(&self, column: &str) -> Result<usize, PipelineError> {
        self.schema
            .index_of(column)
            .ok_or_else(|| PipelineError::UnknownColumn {
                dataset: self.key.to_string(),
                column: column.to_string(),
            })
    }

    pub fn value<'a>(&self, record: &'a Record, column: &str) -> Option<&'a Value> {
        self.schema.index_of(column).map(|i| record.get(i))
    }

    pub fn label(&self, record: &Record, column: &str) -> Option<String> {
        self.value(record, column).and_then(Value::label)
    }
}

/// A record that carries a usable map position.
#[derive(Debug, Clone, Copy)]
pub struct GeoRecord<'a> {
    pub record: &'a Record,
    /// x = longitude, y = latitude
    pub point: Point<f64>,
}

impl GeoRecord<'_> {
    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    pub fn lon(&self) -> f64 {
        self.point.x()
    }
}
