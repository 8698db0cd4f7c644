// ABOUTME: URL-safe function slug validation.
// ABOUTME: Slugs start with a letter and contain only letters, digits, '-' and '_'.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Maximum slug length accepted by the control plane.
const MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FunctionSlugError {
    #[error("function slug cannot be empty")]
    Empty,

    #[error("function slug exceeds maximum length of 63 characters")]
    TooLong,

    #[error("function slug must start with a letter")]
    InvalidStart,

    #[error("invalid character in function slug: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionSlug(String);

impl FunctionSlug {
    pub fn new(value: &str) -> Result<Self, FunctionSlugError> {
        let Some(first) = value.chars().next() else {
            return Err(FunctionSlugError::Empty);
        };

        if value.len() > MAX_LEN {
            return Err(FunctionSlugError::TooLong);
        }

        if !first.is_ascii_alphabetic() {
            return Err(FunctionSlugError::InvalidStart);
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err(FunctionSlugError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FunctionSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for FunctionSlug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FunctionSlug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(&value).map_err(serde::de::Error::custom)
    }
}
