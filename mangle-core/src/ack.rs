use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::Entity;

/// The control mode a record was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Add,
    Del,
    Show,
}

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Del => "del",
            Self::Show => "show",
        }
    }
}

/// An attribute value of an [`Ack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AckValue {
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl From<i64> for AckValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AckValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u16> for AckValue {
    fn from(value: u16) -> Self {
        Self::Int(value.into())
    }
}

impl From<u64> for AckValue {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for AckValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<String> for AckValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AckValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<String>> for AckValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// A structured acknowledgement of a successful control operation.
///
/// Serializes as a map whose first key is the entity kind mapped to the object's name, followed
/// by the entity-specific attributes in insertion order. The mode is not part of the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub mode: Mode,
    pub entity: Entity,
    pub name: String,
    pub attrs: Vec<(&'static str, AckValue)>,
}

impl Ack {
    pub fn new(mode: Mode, entity: Entity, name: impl Into<String>) -> Self {
        Self { mode, entity, name: name.into(), attrs: Vec::new() }
    }

    /// Appends an attribute.
    pub fn with(mut self, key: &'static str, value: impl Into<AckValue>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    /// Returns the value of the attribute `key`, if present.
    pub fn get(&self, key: &str) -> Option<&AckValue> {
        self.attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Returns the integer attribute `key`, if present.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(AckValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

impl Serialize for Ack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attrs.len() + 1))?;
        map.serialize_entry(&self.entity, &self.name)?;
        for (key, value) in &self.attrs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
