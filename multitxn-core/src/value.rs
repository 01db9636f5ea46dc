use serde_json::{Map as JsonMap, Number, Value as Json};
use std::{collections::BTreeMap, sync::Arc};

/// Value produced by a task or bound to a statement parameter.
///
/// Backends convert their native results into this type so that tasks living on different
/// backends can read each other's results through [`Task::get_result`](crate::Task::get_result).
#[derive(Default, Debug, Clone, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Varchar(String),
    Blob(Box<[u8]>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Output of a declarative statement.
    Query(QueryOutput),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
    /// Integer view of the value, floats are accepted only when they have no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Float64(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_query(&self) -> Option<&QueryOutput> {
        match self {
            Value::Query(v) => Some(v),
            _ => None,
        }
    }
    /// Field lookup on a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|v| v.get(key))
    }
    /// Rows of a statement output, empty for any other value.
    pub fn rows(&self) -> &[RowLabeled] {
        self.as_query().map(|v| v.rows.as_slice()).unwrap_or_default()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Int64(value as i64)
                }
            }
        )+
    };
}
impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float64(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Varchar(value)
    }
}

impl From<Box<[u8]>> for Value {
    fn from(value: Box<[u8]>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<QueryOutput> for Value {
    fn from(value: QueryOutput) -> Self {
        Value::Query(value)
    }
}

impl From<RowsAffected> for Value {
    fn from(value: RowsAffected) -> Self {
        Value::Int64(value.rows_affected as i64)
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        match value {
            Json::Null => Value::Null,
            Json::Bool(v) => Value::Boolean(v),
            Json::Number(v) => {
                if let Some(v) = v.as_i64() {
                    Value::Int64(v)
                } else {
                    Value::Float64(v.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(v) => Value::Varchar(v),
            Json::Array(v) => Value::List(v.into_iter().map(Into::into).collect()),
            Json::Object(v) => Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Boolean(v) => Json::Bool(v),
            Value::Int64(v) => Json::Number(v.into()),
            Value::Float64(v) => Number::from_f64(v).map_or(Json::Null, Json::Number),
            Value::Varchar(v) => Json::String(v),
            Value::Blob(v) => Json::Array(v.iter().map(|b| Json::Number((*b).into())).collect()),
            Value::List(v) => Json::Array(v.into_iter().map(Into::into).collect()),
            Value::Map(v) => Json::Object(v.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Query(v) => {
                let mut object = JsonMap::new();
                object.insert(
                    "results".into(),
                    Json::Array(v.rows.into_iter().map(RowLabeled::into_json).collect()),
                );
                object.insert(
                    "affectedRows".into(),
                    Json::Number(v.affected.rows_affected.into()),
                );
                if let Some(id) = v.affected.last_affected_id {
                    object.insert("insertId".into(), Json::Number(id.into()));
                }
                Json::Object(object)
            }
        }
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted identifier when available.
    pub last_affected_id: Option<i64>,
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
    /// Row as a map value keyed by column label.
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.labels
                .iter()
                .cloned()
                .zip(self.values.iter().cloned())
                .collect(),
        )
    }
    fn into_json(self) -> Json {
        self.to_value().into()
    }
}

/// Everything a declarative statement produced.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<RowLabeled>,
    pub affected: RowsAffected,
}
