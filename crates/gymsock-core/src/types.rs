use std::collections::BTreeMap;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::value::Value;

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

/// Step metadata: an ordered map of arbitrary auxiliary values.
pub type Info = BTreeMap<String, InfoValue>;

/// One metadata value.
///
/// Serialization is strict: a non-finite [`InfoValue::Float`] anywhere in the
/// tree makes serialization fail instead of silently emitting `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<InfoValue>),
    Map(Info),
}

impl Serialize for InfoValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => {
                if !f.is_finite() {
                    return Err(S::Error::custom(format!("{f} is not representable as JSON")));
                }
                serializer.serialize_f64(*f)
            }
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<bool> for InfoValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for InfoValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for InfoValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for InfoValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for InfoValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Compact JSON text of a metadata map.
pub fn info_to_json(info: &Info) -> Result<String, serde_json::Error> {
    serde_json::to_string(info)
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Result of `env.step(action)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Value,
    pub reward: f64,
    /// Episode ended, for whatever reason.
    pub done: bool,
    pub info: Info,
}

impl StepResult {
    pub fn new(observation: Value, reward: f64, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: Info::new(),
        }
    }

    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<InfoValue>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
