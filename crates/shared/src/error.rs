use serde::{Deserialize, Serialize};

/// Failure codes reported by the auth provider, normalized from both the
/// REST spelling (`CREDENTIAL_TOO_OLD_LOGIN_AGAIN`) and the SDK spelling
/// (`auth/requires-recent-login`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorCode {
    RequiresRecentLogin,
    InvalidCustomToken,
    TokenExpired,
    UserNotFound,
    UserDisabled,
    RateLimited,
    Other,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresRecentLogin => "requires_recent_login",
            Self::InvalidCustomToken => "invalid_custom_token",
            Self::TokenExpired => "token_expired",
            Self::UserNotFound => "user_not_found",
            Self::UserDisabled => "user_disabled",
            Self::RateLimited => "rate_limited",
            Self::Other => "other",
        }
    }

    pub fn from_provider(raw: &str) -> Self {
        // REST bodies may carry trailing detail: "INVALID_CUSTOM_TOKEN : ...".
        let code = raw.split([' ', ':']).next().unwrap_or(raw).trim();
        match code {
            "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" | "auth/requires-recent-login" => {
                Self::RequiresRecentLogin
            }
            "INVALID_CUSTOM_TOKEN" | "CREDENTIAL_MISMATCH" | "auth/invalid-custom-token"
            | "auth/custom-token-mismatch" => Self::InvalidCustomToken,
            "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "auth/user-token-expired"
            | "auth/invalid-user-token" => Self::TokenExpired,
            "USER_NOT_FOUND" | "auth/user-not-found" => Self::UserNotFound,
            "USER_DISABLED" | "auth/user-disabled" => Self::UserDisabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "auth/too-many-requests" => Self::RateLimited,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
