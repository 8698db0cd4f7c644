// ABOUTME: Validated project reference used in control-plane URLs.
// ABOUTME: Project refs are exactly 20 lowercase ASCII letters.

use std::fmt;
use thiserror::Error;

const REF_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectRefError {
    #[error("project ref cannot be empty")]
    Empty,

    #[error("project ref must be exactly 20 characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid character in project ref: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRef(String);

impl ProjectRef {
    pub fn new(value: &str) -> Result<Self, ProjectRefError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProjectRefError::Empty);
        }

        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_lowercase()) {
            return Err(ProjectRefError::InvalidChar(c));
        }

        if trimmed.len() != REF_LEN {
            return Err(ProjectRefError::InvalidLength(trimmed.len()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
