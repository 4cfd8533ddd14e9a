//! Place and job identity using prefixed ULIDs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

const PLACE_PREFIX: &str = "PLC";
const JOB_PREFIX: &str = "JOB";

/// Identifier of a stored place record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaceId(Ulid);

impl PlaceId {
    /// Create a new, time-ordered PlaceId
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the ULID component
    pub fn ulid(&self) -> Ulid {
        self.0
    }

    /// Parse a PlaceId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl Default for PlaceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of one import or edit run, also used to key its rollback ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(Ulid);

impl JobId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_prefixed(s: &str, expected: &'static str) -> Result<Ulid, IdParseError> {
    let (prefix, ulid_str) = s
        .trim()
        .split_once('-')
        .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

    if !prefix.eq_ignore_ascii_case(expected) {
        return Err(IdParseError::InvalidPrefix {
            found: prefix.to_string(),
            expected,
        });
    }

    Ulid::from_string(ulid_str)
        .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", PLACE_PREFIX, self.0)
    }
}

impl FromStr for PlaceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed(s, PLACE_PREFIX).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", JOB_PREFIX, self.0)
    }
}

impl FromStr for JobId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed(s, JOB_PREFIX).map(Self)
    }
}

impl Serialize for PlaceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PlaceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur when parsing identifiers
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid id prefix: '{found}' (expected {expected})")]
    InvalidPrefix { found: String, expected: &'static str },

    #[error("missing '-' delimiter in id: '{0}'")]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    InvalidUlid(String, String),
}
