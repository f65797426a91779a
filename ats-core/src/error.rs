//! Error kinds for the attestation storage engine.
//!
//! One enum, one variant per error kind in the error-handling design:
//! `NotFound`, `InvalidInput`, `Codec`, `ConstraintViolation`, `Backend`,
//! `CancelledOrTimedOut`, `QuotaEnforcement`.

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the attestation storage engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested row does not exist. Distinct from a backend error.
    #[error("not found: {0}")]
    NotFound(String),

    /// A synchronous validation failure at an entry point.
    #[error("invalid input ({field}): {message}")]
    InvalidInput {
        /// The offending field name.
        field: String,
        /// Human-readable description of the problem.
        message: String,
    },

    /// A (de)serialization failure of a facet or attribute field.
    #[error("codec error on field `{field}`{}: {source}", attestation_id.as_deref().map(|id| format!(" (attestation {id})")).unwrap_or_default())]
    Codec {
        /// The field that failed to (de)serialize.
        field: String,
        /// The attestation ID, if known.
        attestation_id: Option<String>,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A uniqueness or foreign-key constraint was violated.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The underlying embedded SQL engine failed.
    #[error("backend error during {operation}: {message}")]
    Backend {
        /// The operation name (e.g. `"create_attestation"`).
        operation: String,
        /// Human-readable detail.
        message: String,
    },

    /// The caller's cancellation context fired or a timeout elapsed.
    #[error("cancelled or timed out")]
    CancelledOrTimedOut,

    /// Bounded-store enforcement failed. Always logged and swallowed at the
    /// API boundary; the initiating insert is never failed by this variant.
    #[error("quota enforcement failed for actor={actor}, context={context}, stage={stage}: {message}")]
    QuotaEnforcement {
        /// Actor the enforcement pass was operating on.
        actor: String,
        /// Context the enforcement pass was operating on.
        context: String,
        /// Which of the three quota stages failed.
        stage: String,
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidInput`] for the named field.
    #[must_use]
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build an [`Error::Backend`] for the named operation.
    #[must_use]
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this error is recoverable by retrying with backoff.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Backend { .. } | Error::CancelledOrTimedOut | Error::QuotaEnforcement { .. }
        )
    }

    /// Whether this represents an absent row rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_recoverable() {
        let err = Error::backend("create", "connection reset");
        assert!(err.is_recoverable());
    }

    #[test]
    fn not_found_is_not_recoverable() {
        let err = Error::NotFound("AS-1".to_string());
        assert!(!err.is_recoverable());
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_input_is_not_recoverable() {
        let err = Error::invalid_input("actor", "must not be empty");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn codec_error_message_includes_attestation_id() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = Error::Codec {
            field: "subjects".to_string(),
            attestation_id: Some("AS-1".to_string()),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("subjects"));
        assert!(msg.contains("AS-1"));
    }
}
