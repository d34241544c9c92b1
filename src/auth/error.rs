use thiserror::Error;


/// Everything that can end a login attempt or refuse an authenticated call.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("the authorization window could not be opened: {0}")]
    BlockedPopup(String),
    #[error("the authorization window was closed before completion")]
    Cancelled,
    #[error("returned state does not match the stored nonce")]
    StateMismatch,
    #[error("no provider callback arrived in time")]
    Timeout,
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("not authenticated with GitHub")]
    NotAuthenticated,
    #[error("session storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Short machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::BlockedPopup(_) => "blocked_popup",
            AuthError::Cancelled => "cancelled",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::Timeout => "timeout",
            AuthError::ProviderError(_) => "provider_error",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::Storage(_) => "storage",
        }
    }

    /// Whether retrying the same operation can succeed without re-authenticating
    /// or discarding the attempt.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AuthError::StateMismatch | AuthError::NotAuthenticated => false,
            _ => true,
        }
    }

    pub(crate) fn provider(message: impl ToString) -> Self {
        AuthError::ProviderError(message.to_string())
    }
}


#[cfg(test)]
mod tests {
    use crate::auth::AuthError;

    #[test]
    fn test_recoverable_kinds() {
        assert!(AuthError::BlockedPopup("blocked".into()).is_recoverable());
        assert!(AuthError::Cancelled.is_recoverable());
        assert!(AuthError::Timeout.is_recoverable());
        assert!(AuthError::provider("access_denied").is_recoverable());
        assert!(!AuthError::StateMismatch.is_recoverable());
        assert!(!AuthError::NotAuthenticated.is_recoverable());
    }

    #[test]
    fn test_provider_error_message() {
        let error = AuthError::provider("access_denied");
        assert_eq!(error.to_string(), "provider error: access_denied");
        assert_eq!(error.kind(), "provider_error");
    }
}
