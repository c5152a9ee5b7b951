use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use shared::{domain::AuthUser, error::AuthErrorCode};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

pub mod error;
pub mod settings;
pub mod token_exchange;

pub use error::AuthError;
pub use settings::{load_settings, Settings};

/// Broadcast on every session transition.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStateChange {
    SignedIn(AuthUser),
    SignedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionTokens {
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Seam between the bridge and whatever supplies authentication. The
/// production implementation is [`IdentityClient`]; tests substitute doubles.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_custom_token(&self, token: &str) -> Result<AuthUser, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn delete_current_user(&self) -> Result<(), AuthError>;
    async fn current_user(&self) -> Option<AuthUser>;
    fn subscribe_auth_state(&self) -> broadcast::Receiver<AuthStateChange>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in seconds, carried as a decimal string on the wire.
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdTokenRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderUserInfo>,
    /// Epoch milliseconds as a decimal string.
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUserInfo {
    #[serde(default)]
    provider_id: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Default)]
struct SessionState {
    tokens: Option<SessionTokens>,
    user: Option<AuthUser>,
}

/// Auth client against an identity-toolkit-style REST surface: API-key query
/// authentication, `accounts:signInWithCustomToken` / `accounts:lookup` /
/// `accounts:delete` verbs, `{ "error": { "message": CODE } }` failures.
pub struct IdentityClient {
    http: Client,
    endpoint_base: String,
    api_key: String,
    session: Mutex<SessionState>,
    auth_state: broadcast::Sender<AuthStateChange>,
}

impl IdentityClient {
    pub fn new(settings: &Settings) -> Result<Arc<Self>, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .build()?;
        let (auth_state, _) = broadcast::channel(64);
        Ok(Arc::new(Self {
            http,
            endpoint_base: settings.identity_base(),
            api_key: settings.api_key.clone(),
            session: Mutex::new(SessionState::default()),
            auth_state,
        }))
    }

    pub async fn session_tokens(&self) -> Option<SessionTokens> {
        self.session.lock().await.tokens.clone()
    }

    fn endpoint(&self, verb: &str) -> String {
        format!("{}/accounts:{verb}?key={}", self.endpoint_base, self.api_key)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        verb: &str,
        body: &impl Serialize,
    ) -> Result<T, AuthError> {
        let response = self.http.post(self.endpoint(verb)).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(provider_error(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn lookup_user(&self, id_token: &str) -> Result<AuthUser, AuthError> {
        let response: LookupResponse = self.post_json("lookup", &IdTokenRequest { id_token }).await?;
        let record = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::Provider {
                code: AuthErrorCode::UserNotFound,
                message: "account lookup returned no users".to_string(),
            })?;
        Ok(user_from_record(record))
    }

    async fn clear_session(&self) -> bool {
        let mut session = self.session.lock().await;
        let had_session = session.tokens.is_some() || session.user.is_some();
        session.tokens = None;
        session.user = None;
        had_session
    }
}

fn provider_error(status: reqwest::StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| format!("http status {status}"));
    AuthError::Provider {
        code: AuthErrorCode::from_provider(&message),
        message,
    }
}

fn user_from_record(record: UserRecord) -> AuthUser {
    let created_at = record
        .created_at
        .as_deref()
        .and_then(|millis| millis.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    let provider_id = record
        .provider_user_info
        .into_iter()
        .find_map(|info| info.provider_id);

    let mut user = AuthUser::new(record.local_id);
    user.email = record.email;
    user.display_name = record.display_name;
    user.provider_id = provider_id;
    user.created_at = created_at;
    user
}

fn expiry_from_lifetime(expires_in: Option<&str>) -> Option<DateTime<Utc>> {
    let seconds = expires_in?.parse::<i64>().ok()?;
    Some(Utc::now() + chrono::Duration::seconds(seconds))
}

#[async_trait]
impl AuthProvider for IdentityClient {
    async fn sign_in_with_custom_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let signed_in: SignInResponse = self
            .post_json(
                "signInWithCustomToken",
                &SignInRequest {
                    token,
                    return_secure_token: true,
                },
            )
            .await?;
        let user = self.lookup_user(&signed_in.id_token).await?;

        {
            let mut session = self.session.lock().await;
            session.tokens = Some(SessionTokens {
                id_token: signed_in.id_token,
                refresh_token: signed_in.refresh_token,
                expires_at: expiry_from_lifetime(signed_in.expires_in.as_deref()),
            });
            session.user = Some(user.clone());
        }

        info!(uid = %user.uid, "auth: signed in with custom token");
        let _ = self.auth_state.send(AuthStateChange::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.clear_session().await {
            info!("auth: signed out");
            let _ = self.auth_state.send(AuthStateChange::SignedOut);
        }
        Ok(())
    }

    async fn delete_current_user(&self) -> Result<(), AuthError> {
        let id_token = {
            let session = self.session.lock().await;
            session.tokens.as_ref().map(|tokens| tokens.id_token.clone())
        }
        .ok_or(AuthError::NoCurrentUser)?;

        let _: Value = self
            .post_json("delete", &IdTokenRequest {
                id_token: &id_token,
            })
            .await?;

        self.clear_session().await;
        info!("auth: account deleted");
        let _ = self.auth_state.send(AuthStateChange::SignedOut);
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.session.lock().await.user.clone()
    }

    fn subscribe_auth_state(&self) -> broadcast::Receiver<AuthStateChange> {
        self.auth_state.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
