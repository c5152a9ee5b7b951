use shared::error::AuthErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered with an error body; `code` is the normalized
    /// form of whatever spelling it used.
    #[error("auth provider rejected request: {code} ({message})")]
    Provider {
        code: AuthErrorCode,
        message: String,
    },
    #[error("no user is currently signed in")]
    NoCurrentUser,
    #[error("auth provider transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed auth provider response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl AuthError {
    pub fn code(&self) -> Option<AuthErrorCode> {
        match self {
            Self::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn requires_recent_login(&self) -> bool {
        self.code() == Some(AuthErrorCode::RequiresRecentLogin)
    }
}
