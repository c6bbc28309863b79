//! Name patterns of ConfigMatch source selectors.

use regex::Regex;
use thiserror::Error;

/// A source pattern that failed to compile.
///
/// Recompiling the same pattern cannot succeed, so reconciliations that hit
/// this are reported and not retried.
#[derive(Error, Debug, Clone)]
#[error("Invalid pattern '{pattern}': {source}")]
pub struct CompileError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A compiled source pattern.
///
/// Matching is unanchored: the pattern may match anywhere in the name unless
/// it carries its own `^`/`$` anchors.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
}

impl CompiledPattern {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

pub fn compile(pattern: &str) -> Result<CompiledPattern, CompileError> {
    Regex::new(pattern)
        .map(|regex| CompiledPattern { regex })
        .map_err(|source| CompileError {
            pattern: pattern.to_string(),
            source,
        })
}
