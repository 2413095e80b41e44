//! Fatal error type of the comparison engine.
//!
//! Only conditions that make a comparison meaningless are errors.
//! A mismatch between designs, or a user abort, is a normal
//! [`NccResult`](crate::NccResult) instead.

use std::fmt;

/// A fatal error raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NccError {
    /// The caller handed us something we cannot compare:
    /// too few designs, unknown cells, malformed connections,
    /// cyclic hierarchies, unparsable annotations.
    InvalidInput(String),
    /// An internal consistency check failed. Continuing would
    /// give meaningless results.
    Invariant(String),
}

impl NccError {
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> NccError {
        NccError::InvalidInput(msg.into())
    }

    #[inline]
    pub fn invariant(msg: impl Into<String>) -> NccError {
        NccError::Invariant(msg.into())
    }

    /// true if this error indicates a bug in the engine rather
    /// than bad input.
    #[inline]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, NccError::Invariant(_))
    }
}

impl fmt::Display for NccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NccError::InvalidInput(s) => write!(f, "ncc invalid input: {}", s),
            NccError::Invariant(s) => write!(f, "ncc internal invariant violated: {}", s),
        }
    }
}

impl std::error::Error for NccError {}

/// Return an [`NccError::Invariant`] unless `cond` holds.
#[inline]
pub(crate) fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<(), NccError> {
    match cond {
        true => Ok(()),
        false => Err(NccError::Invariant(msg()))
    }
}
