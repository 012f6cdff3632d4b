//! String-keyed metadata attached to a mesh.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mesh_error::MeshError;

/// A single metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}
impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}
impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}
impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}
impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_owned())
    }
}
impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

/// Ordered key/value store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, MetaValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.entries.remove(key)
    }

    /// Integer entry; `Ok(None)` when absent.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, MeshError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(MetaValue::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(MeshError::MetadataType {
                key: key.to_owned(),
                expected: "int",
            }),
        }
    }

    /// Integer entry or `default` when absent.
    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, MeshError> {
        Ok(self.get_int(key)?.unwrap_or(default))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, MeshError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(MetaValue::Bool(v)) => Ok(Some(*v)),
            Some(_) => Err(MeshError::MetadataType {
                key: key.to_owned(),
                expected: "bool",
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
