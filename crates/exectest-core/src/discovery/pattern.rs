//! Basename wildcard patterns.

use regex::Regex;
use thiserror::Error;

/// Errors compiling a basename pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Pattern {0:?} has no basename segment")]
    Empty(String),

    #[error("Pattern {pattern:?} failed to compile: {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A wildcard matched against file basenames only.
///
/// Only the last `/` or `\` separated segment of the pattern is used. `*`
/// matches any run of characters; everything else is literal.
#[derive(Debug, Clone)]
pub struct BasenamePattern {
    source: String,
    regex: Regex,
}

impl BasenamePattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let segment = pattern.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
        if segment.is_empty() {
            return Err(PatternError::Empty(pattern.to_string()));
        }

        let body = segment
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{body}$")).map_err(|source| PatternError::Compile {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: segment.to_string(),
            regex,
        })
    }

    /// The basename segment this pattern matches with.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether a basename matches.
    pub fn is_match(&self, basename: &str) -> bool {
        self.regex.is_match(basename)
    }
}
