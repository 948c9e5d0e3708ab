//! Error types for compilation and execution.

use thiserror::Error;

use crate::runtime::value::Value;

/// Errors that can occur while compiling or running a script.
///
/// The first five variants mirror the ECMAScript native error constructors.
/// `Thrown` carries an arbitrary value raised by a `throw` statement.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed input the code generator cannot lower
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// Type error during execution
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference to an unresolvable binding
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (call depth, invalid lengths)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal engine error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// A script-level `throw` of an arbitrary value
    #[error("Uncaught {0}")]
    Thrown(Value),
}

impl Error {
    /// Creates a `TypeError` from anything string-like.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::TypeError(message.into())
    }

    /// Creates a `SyntaxError` from anything string-like.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Error::SyntaxError(message.into())
    }

    /// Creates a `ReferenceError` from anything string-like.
    pub fn reference_error(message: impl Into<String>) -> Self {
        Error::ReferenceError(message.into())
    }

    /// The constructor name a script observes when it catches this error.
    pub fn name(&self) -> &'static str {
        match self {
            Error::SyntaxError(_) => "SyntaxError",
            Error::TypeError(_) => "TypeError",
            Error::ReferenceError(_) => "ReferenceError",
            Error::RangeError(_) => "RangeError",
            Error::InternalError(_) => "InternalError",
            Error::Thrown(_) => "Error",
        }
    }

    /// Returns true for `TypeError`.
    pub fn is_type_error(&self) -> bool {
        matches!(self, Error::TypeError(_))
    }
}

/// Result alias used throughout the runtime.
pub type JsResult<T> = std::result::Result<T, Error>;

/// Returns early with a `TypeError`.
macro_rules! throw_type_error {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::TypeError(format!($($arg)*)))
    };
}

pub(crate) use throw_type_error;
