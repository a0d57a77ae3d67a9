// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for tier operations.

use std::fmt;

/// Broad classification of a tier failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backing store could not be reached (connection refused, dropped, timed out).
    Unavailable,
    /// The store answered with something the client did not expect.
    Protocol,
    /// A payload could not be encoded or decoded.
    Codec,
    /// Invalid configuration was supplied.
    Config,
}

impl ErrorKind {
    /// Returns a short, stable label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Protocol => "protocol",
            Self::Codec => "codec",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a tier operation.
///
/// The error is opaque apart from its [`ErrorKind`]; use
/// [`std::error::Error::source()`] to reach the underlying cause.
///
/// # Example
///
/// ```
/// use strata_tier::{Error, ErrorKind};
///
/// let error = Error::unavailable("connection refused");
/// assert_eq!(error.kind(), ErrorKind::Unavailable);
/// ```
#[ohno::error]
#[display("{kind} cache error")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Creates an [`ErrorKind::Unavailable`] error.
    pub fn unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Unavailable, cause)
    }

    /// Creates an [`ErrorKind::Protocol`] error.
    pub fn protocol(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Protocol, cause)
    }

    /// Creates an [`ErrorKind::Codec`] error.
    pub fn codec(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Codec, cause)
    }

    /// Creates an [`ErrorKind::Config`] error.
    pub fn config(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Config, cause)
    }
}

/// A specialized [`Result`] type for tier operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_contains_kind_and_cause() {
        let error = Error::unavailable("connection refused");
        let display_str = format!("{error}");
        assert!(display_str.contains("unavailable"), "got: {display_str}");
        assert!(display_str.contains("connection refused"), "got: {display_str}");
    }

    #[test]
    fn constructors_set_kind() {
        assert_eq!(Error::protocol("x").kind(), ErrorKind::Protocol);
        assert_eq!(Error::codec("x").kind(), ErrorKind::Codec);
        assert_eq!(Error::config("x").kind(), ErrorKind::Config);
        assert_eq!(Error::new(ErrorKind::Unavailable).kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::protocol("unexpected reply"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(format!("{err}").contains("unexpected reply"));
    }
}
