//! Enrollment labels.
//!
//! A label names a group of uploaded photos and doubles as a directory name
//! under the image store, so it must always be a single safe path segment.

use std::fmt;
use thiserror::Error;

const LABEL_MAX_LEN: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,
    #[error("label exceeds {LABEL_MAX_LEN} characters")]
    TooLong,
    #[error("label may not start with '.' or a space")]
    BadStart,
    #[error("label may not end with a space")]
    TrailingSpace,
    #[error("label contains disallowed character {0:?}")]
    InvalidChar(char),
}

/// A validated enrollment label.
///
/// Allowed characters are ASCII letters, digits, `_`, `-`, `.` and space.
/// The first character may not be `.` or a space, which rules out `.`, `..`
/// and hidden directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn parse(raw: &str) -> Result<Self, LabelError> {
        if raw.is_empty() {
            return Err(LabelError::Empty);
        }
        if raw.chars().count() > LABEL_MAX_LEN {
            return Err(LabelError::TooLong);
        }
        if raw.starts_with('.') || raw.starts_with(' ') {
            return Err(LabelError::BadStart);
        }
        if raw.ends_with(' ') {
            return Err(LabelError::TrailingSpace);
        }
        if let Some(c) = raw
            .chars()
            .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ')))
        {
            return Err(LabelError::InvalidChar(c));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for Label {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl std::str::FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
