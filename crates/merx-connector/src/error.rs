//! Connector error types with transient/fatal classification.

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to establish connection to the external platform.
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The external platform did not answer in time.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Invalid credentials or expired token.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The platform throttled a request; a later retry may succeed.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The platform's rate budget is spent for this window; the
    /// enclosing job cannot make progress.
    #[error("rate limit exhausted: {message}")]
    RateLimitExhausted { message: String },

    /// The pagination cursor was rejected by the platform.
    #[error("invalid cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Object not found in the external system.
    #[error("object not found: {external_id}")]
    ObjectNotFound { external_id: String },

    /// The platform rejected a pushed record.
    #[error("rejected by platform: {message}")]
    Rejected { message: String },

    /// The platform returned a payload the connector cannot interpret.
    #[error("invalid data from platform: {message}")]
    InvalidData { message: String },

    /// Internal connector error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Create a connection failure.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create an authentication failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Create a rate-limited error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Create a rate-limit-exhausted error.
    pub fn rate_limit_exhausted(message: impl Into<String>) -> Self {
        Self::RateLimitExhausted {
            message: message.into(),
        }
    }

    /// Create a rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is caused by a temporary condition.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::RateLimited { .. }
        )
    }

    /// Check if this error must abort the enclosing sync job rather
    /// than being attributed to a single record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::AuthenticationFailed { .. }
                | ConnectorError::RateLimitExhausted { .. }
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectorError::authentication("token expired");
        assert!(err.to_string().contains("token expired"));

        let err = ConnectorError::ConnectionTimeout { timeout_secs: 30 };
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ConnectorError::connection_failed("reset").is_transient());
        assert!(ConnectorError::rate_limited("429").is_transient());
        assert!(!ConnectorError::authentication("denied").is_transient());
        assert!(!ConnectorError::rejected("bad sku").is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ConnectorError::authentication("denied").is_fatal());
        assert!(ConnectorError::rate_limit_exhausted("spent").is_fatal());
        assert!(!ConnectorError::rate_limited("429").is_fatal());
        assert!(!ConnectorError::rejected("bad sku").is_fatal());
    }
}
