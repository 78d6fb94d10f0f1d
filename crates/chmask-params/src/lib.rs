//! Parameter naming, registry and `NAME=VALUE` parsing for the channel-mask stage.
//!
//! Parameters are identified by a [`ParamId`] handed out by a [`ParamRegistry`].
//! The stage owns `USE` and one `CH<n>Enable` per channel; everything else in
//! the registry belongs to the host.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Name of the master enable parameter.
pub const USE_MASK: &str = "USE";

const CHANNEL_PREFIX: &str = "CH";
const CHANNEL_SUFFIX: &str = "Enable";

/// Opaque handle of a registered parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("unknown parameter {0}")]
    Unknown(ParamId),
    #[error("parameter `{0}` already registered")]
    Duplicate(String),
    #[error("parameter `{0}` is read-only")]
    ReadOnly(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected NAME=VALUE, got `{0}`")]
    MissingEquals(String),
    #[error("empty parameter name in `{0}`")]
    EmptyName(String),
    #[error("invalid integer value `{value}` for `{name}`")]
    BadValue { name: String, value: String },
}

/// Parameter name for channel `index` (0-based). Names are 1-indexed.
pub fn channel_enable_name(index: usize) -> String {
    format!("{CHANNEL_PREFIX}{}{CHANNEL_SUFFIX}", index + 1)
}

/// Inverse of [`channel_enable_name`]: `CH3Enable` -> `Some(2)`.
pub fn parse_channel_enable(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(CHANNEL_PREFIX)?.strip_suffix(CHANNEL_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: usize = digits.parse().ok()?;
    n.checked_sub(1)
}

/// Flat name -> id table. Filled once while instances are constructed, then
/// only read, so it needs no lock of its own.
#[derive(Debug, Default, Clone)]
pub struct ParamRegistry {
    names: Vec<String>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str) -> Result<ParamId, ParamError> {
        if self.find(name).is_some() {
            return Err(ParamError::Duplicate(name.to_string()));
        }
        self.names.push(name.to_string());
        Ok(ParamId(self.names.len() - 1))
    }

    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.names.iter().position(|n| n == name).map(ParamId)
    }

    pub fn name(&self, id: ParamId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (ParamId(i), n.as_str()))
    }
}

/// A single `NAME=VALUE` write as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: i32,
}

impl FromStr for Assignment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| ParseError::MissingEquals(s.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::EmptyName(s.to_string()));
        }
        let value = value.trim();
        let parsed = value.parse::<i32>().map_err(|_| ParseError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        Ok(Self { name: name.to_string(), value: parsed })
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}
