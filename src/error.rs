//! Failure categories of the element engine.
//!
//! Three kinds of failure are kept apart: user-visible errors
//! ([`EngineError`]), the internal [`Relink`] signal raised by stale
//! call-site speculation, and [`NotApplicable`] from the continuous fast
//! paths. A [`TruncateError`] reports a length change that stopped early.

use thiserror::Error;

/// A reportable error surfaced to the language level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("RangeError: {0}")]
    Range(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("SyntaxError: {0}")]
    Syntax(String),
}

impl EngineError {
    pub fn range(msg: impl Into<String>) -> Self {
        EngineError::Range(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        EngineError::Type(msg.into())
    }

    /// Name of the language-level error constructor.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EngineError::Range(_) => "RangeError",
            EngineError::Type(_) => "TypeError",
            EngineError::Syntax(_) => "SyntaxError",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A speculative call-site guard no longer holds; retry on the generic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("call site assumption is stale")]
pub struct Relink;

/// A continuous fast path was asked to run on a store it cannot handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fast path not applicable")]
pub struct NotApplicable;

impl From<NotApplicable> for Relink {
    fn from(_: NotApplicable) -> Self {
        Relink
    }
}

/// Shortening `length` hit an index the object model refuses to delete.
///
/// Everything above `retained` was removed; `length` now equals `retained`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot delete index {} while truncating to {requested}", .retained - 1)]
pub struct TruncateError {
    pub requested: u32,
    pub retained: u32,
}

impl From<TruncateError> for EngineError {
    fn from(e: TruncateError) -> Self {
        EngineError::Type(e.to_string())
    }
}
