use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

pub type Document = Map<String, Json>;

/// Conjunction of field equalities, the empty filter matches every document.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Filter {
    fields: Vec<(String, Json)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }
    pub fn eq(field: impl Into<String>, value: impl Into<Json>) -> Self {
        Self::all().and(field, value)
    }
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }
    pub fn matches(&self, document: &Document) -> bool {
        self.fields
            .iter()
            .all(|(k, v)| document.get(k).unwrap_or(&Json::Null) == v)
    }
}

/// Built from a JSON object, `{"accountId": "a1"}` matches the documents whose `accountId` is `"a1"`.
impl From<Json> for Filter {
    fn from(value: Json) -> Self {
        match value {
            Json::Object(map) => Self {
                fields: map.into_iter().collect(),
            },
            _ => Self::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
    pub(crate) fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_json(
            a.get(&self.field).unwrap_or(&Json::Null),
            b.get(&self.field).unwrap_or(&Json::Null),
        );
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn type_rank(value: &Json) -> u8 {
    match value {
        Json::Null => 0,
        Json::Number(..) => 1,
        Json::String(..) => 2,
        Json::Object(..) => 3,
        Json::Array(..) => 4,
        Json::Bool(..) => 5,
    }
}

/// Total order across JSON values: null, numbers, strings, objects, arrays, booleans.
pub(crate) fn compare_json(a: &Json, b: &Json) -> Ordering {
    match (a, b) {
        (Json::Number(a), Json::Number(b)) => a
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&b.as_f64().unwrap_or_default()),
        (Json::String(a), Json::String(b)) => a.cmp(b),
        (Json::Bool(a), Json::Bool(b)) => a.cmp(b),
        (Json::Array(a), Json::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(a, b)| compare_json(a, b))
            .find(|v| v.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Json::Object(a), Json::Object(b)) => a.len().cmp(&b.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
