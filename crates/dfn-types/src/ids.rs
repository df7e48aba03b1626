use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid cell id '{value}': expected 1-16 hex digits")]
    InvalidCellId { value: String },
    #[error("invalid tag name '{value}': expected an identifier")]
    InvalidTagName { value: String },
}

/// Execution-counter cell identifier, rendered as lowercase hex.
///
/// Assigned monotonically by the orchestrator, unique per notebook
/// session and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    pub fn new(counter: u64) -> Self {
        CellId(counter)
    }

    pub fn from_hex(value: &str) -> Result<Self, IdError> {
        if value.is_empty() || value.len() > 16 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::InvalidCellId {
                value: value.to_string(),
            });
        }
        let counter = u64::from_str_radix(value, 16).map_err(|_| IdError::InvalidCellId {
            value: value.to_string(),
        })?;
        Ok(CellId(counter))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for CellId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellId::from_hex(s)
    }
}

impl Serialize for CellId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&format_args!("{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CellId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Named, exportable value slot a cell can publish.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagName(String);

impl TagName {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if is_valid_tag(&value) {
            Ok(TagName(value))
        } else {
            Err(IdError::InvalidTagName { value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_tag(value: &str) -> bool {
    let mut bytes = value.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl fmt::Debug for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagName {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagName::new(s)
    }
}

impl Serialize for TagName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TagName::new(s).map_err(serde::de::Error::custom)
    }
}
