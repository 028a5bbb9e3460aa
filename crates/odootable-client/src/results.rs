//! Query result types for the odootable client

use indexmap::IndexMap;
use odootable_common::{OdooTableError, Result, Value};

/// A single record as returned by the server, fields in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, failing on anything else.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            }),
            other => Err(OdooTableError::Protocol(format!(
                "expected a record object, got {other}"
            ))),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Get a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get all field names.
    pub fn fields(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// All records of one query, in the order the server returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn extend(&mut self, page: Vec<Record>) {
        self.records.extend(page);
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}
