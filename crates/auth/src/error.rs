//! Error type for token-endpoint exchanges.

use thiserror::Error;

/// Classified failure from a token-endpoint exchange.
///
/// The variant, not the message, decides recoverability: transient failures
/// are retried by the client's internal backoff, everything else fails the
/// refresh immediately.
#[derive(Debug, Error)]
pub enum TokenServerError {
    /// Network failure or 5xx from the token server; retryable.
    #[error("token server unavailable: {message}")]
    Transient { message: String },

    /// Definitive OAuth2 error response (RFC 6749 §5.2), e.g.
    /// `invalid_grant` or `invalid_client`; never retried.
    #[error("token server rejected the grant ({code}){}", description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    AuthServer { code: String, description: Option<String> },

    /// The token server replied with a body this client cannot parse;
    /// retrying a malformed-response bug wastes resources.
    #[error("malformed token server response: {message}")]
    Protocol { message: String },

    /// The caller's time budget ran out during the exchange.
    #[error("deadline exceeded during token exchange")]
    DeadlineExceeded,
}

impl TokenServerError {
    /// Whether the same exchange could plausibly succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The OAuth2 error code, when the server returned one.
    pub fn auth_error_code(&self) -> Option<&str> {
        match self {
            Self::AuthServer { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token server error classification.
    use super::*;

    #[test]
    fn classification() {
        assert!(TokenServerError::Transient { message: "503".into() }.is_transient());
        assert!(!TokenServerError::AuthServer { code: "invalid_grant".into(), description: None }
            .is_transient());
        assert!(!TokenServerError::Protocol { message: "bad json".into() }.is_transient());
        assert!(!TokenServerError::DeadlineExceeded.is_transient());
    }

    #[test]
    fn auth_error_code_accessor() {
        let err = TokenServerError::AuthServer {
            code: "invalid_client".into(),
            description: Some("unknown client".into()),
        };
        assert_eq!(err.auth_error_code(), Some("invalid_client"));
        assert!(err.to_string().contains("invalid_client"));
        assert!(err.to_string().contains("unknown client"));

        assert_eq!(TokenServerError::DeadlineExceeded.auth_error_code(), None);
    }
}
