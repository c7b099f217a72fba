//! Error types for planning.

use bunny_llb::LlbError;
use std::fmt;
use thiserror::Error;

/// Broad classification of a planning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or contradictory input fields
    Validation,
    /// Rootfs type, monitor or architecture unsupported by the framework
    Capability,
    /// Malformed include entries or failed rootfs synthesis
    Resolution,
    /// A planning invariant was broken; this is a bug, not a user error
    Invariant,
    /// The operation graph could not be produced or executed
    Materialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Capability => "capability",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Invariant => "invariant",
            ErrorKind::Materialization => "materialization",
        };
        f.write_str(name)
    }
}

/// Error raised while turning a packaging request into a plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HopsError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Capability(String),

    #[error("{0}")]
    Resolution(String),

    #[error("Internal error: {0}")]
    Invariant(String),

    #[error("{0}")]
    Materialization(String),
}

impl HopsError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            HopsError::Validation(_) => ErrorKind::Validation,
            HopsError::Capability(_) => ErrorKind::Capability,
            HopsError::Resolution(_) => ErrorKind::Resolution,
            HopsError::Invariant(_) => ErrorKind::Invariant,
            HopsError::Materialization(_) => ErrorKind::Materialization,
        }
    }

    /// Prefix the message with `context`, keeping the kind.
    #[must_use]
    pub fn context(self, context: &str) -> Self {
        let wrap = |message: String| format!("{context}: {message}");
        match self {
            HopsError::Validation(m) => HopsError::Validation(wrap(m)),
            HopsError::Capability(m) => HopsError::Capability(wrap(m)),
            HopsError::Resolution(m) => HopsError::Resolution(wrap(m)),
            HopsError::Invariant(m) => HopsError::Invariant(wrap(m)),
            HopsError::Materialization(m) => HopsError::Materialization(wrap(m)),
        }
    }
}

impl From<serde_yaml::Error> for HopsError {
    fn from(err: serde_yaml::Error) -> Self {
        HopsError::Validation(format!("Failed to parse bunnyfile: {err}"))
    }
}

impl From<LlbError> for HopsError {
    fn from(err: LlbError) -> Self {
        HopsError::Materialization(format!("Failed to marshal LLB state: {err}"))
    }
}

/// Result type for planning operations.
pub type HopsResult<T> = Result<T, HopsError>;
