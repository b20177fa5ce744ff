use std::fmt;

use thiserror::Error;

/// Condition tags carried by every [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A required input (plaintext, password, salt, parameter) was empty or out of range.
    InvalidInput,
    /// The algorithm selector is not one of the known algorithms.
    UnsupportedAlgorithm,
    /// The algorithm is recognized but has no implementation yet.
    NotImplemented,
    /// The bundle record failed structural or length validation.
    MalformedBundle,
    /// The key derivation primitive failed or the KDF name is unknown.
    KeyDerivationFailed,
    /// Tag verification failed: wrong password or tampered data.
    AuthenticationFailed,
    /// The operating system random source could not be used.
    RandomSourceUnavailable,
    /// The host cancelled the operation at a stage boundary.
    Cancelled,
}

impl ErrorKind {
    /// Stable message suitable for showing to a user.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "A required field is empty or has an invalid value",
            ErrorKind::UnsupportedAlgorithm => "The selected algorithm is not supported",
            ErrorKind::NotImplemented => "The selected algorithm is not implemented yet",
            ErrorKind::MalformedBundle => "The encrypted message is malformed or incomplete",
            ErrorKind::KeyDerivationFailed => "Could not derive a key from the password",
            ErrorKind::AuthenticationFailed => "Invalid password or corrupted data",
            ErrorKind::RandomSourceUnavailable => {
                "The system random number generator is unavailable"
            }
            ErrorKind::Cancelled => "The operation was cancelled",
        }
    }

    /// Fatal kinds must never be retried or worked around.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::RandomSourceUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::UnsupportedAlgorithm => "UnsupportedAlgorithm",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::MalformedBundle => "MalformedBundle",
            ErrorKind::KeyDerivationFailed => "KeyDerivationFailed",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::RandomSourceUnavailable => "RandomSourceUnavailable",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Failure returned by every public pipeline operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {detail}", .kind.user_message())]
pub struct PipelineError {
    kind: ErrorKind,
    detail: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedBundle, detail)
    }

    pub fn not_implemented(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, detail)
    }

    pub fn key_derivation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyDerivationFailed, detail)
    }

    /// Authentication failures never carry their root cause.
    pub fn authentication_failed() -> Self {
        Self::new(ErrorKind::AuthenticationFailed, "authentication tag mismatch")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Result shape of every public pipeline operation.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history entry '{0}' not found")]
    EntryNotFound(String),

    #[error("history data is invalid: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_has_one_generic_message() {
        let err = PipelineError::authentication_failed();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(
            err.to_string(),
            "Invalid password or corrupted data: authentication tag mismatch"
        );
    }

    #[test]
    fn only_random_source_failure_is_fatal() {
        assert!(ErrorKind::RandomSourceUnavailable.is_fatal());
        assert!(!ErrorKind::AuthenticationFailed.is_fatal());
        assert!(!ErrorKind::MalformedBundle.is_fatal());
    }

    #[test]
    fn display_includes_detail() {
        let err = PipelineError::malformed("missing field 'nonce'");
        assert!(err.to_string().contains("missing field 'nonce'"));
        assert_eq!(ErrorKind::MalformedBundle.to_string(), "MalformedBundle");
    }
}
