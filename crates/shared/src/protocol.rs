use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{AuthUser, Uid};

/// Raw form both mailboxes carry: a kind discriminant plus an opaque
/// payload. Dispatchers check `msg` and pass the payload through untouched;
/// typed views are opt-in via `TryFrom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    pub fn new(msg: impl Into<String>, payload: Value) -> Self {
        Self {
            msg: msg.into(),
            payload,
        }
    }
}

/// Host -> UI message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "payload")]
pub enum UiNotification {
    /// The provider's auth state changed; `None` means signed out.
    #[serde(rename = "OnAuthStateChanged")]
    AuthStateChanged(Option<AuthUser>),
    /// The UI should treat the payload as the current absolute URL.
    UrlReceived(String),
}

impl UiNotification {
    pub const KINDS: [&'static str; 2] = ["OnAuthStateChanged", "UrlReceived"];

    pub fn recognizes(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthStateChanged(_) => "OnAuthStateChanged",
            Self::UrlReceived(_) => "UrlReceived",
        }
    }
}

/// UI -> host command kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", content = "payload")]
pub enum HostCommand {
    /// Route a UI-side error into the host log.
    LogError(Value),
    /// Delete the currently signed-in account. The uid is carried for
    /// diagnostics only; deletion always targets the current session.
    DeleteUser(Uid),
    /// Exchange a token against the given URL, then sign in with it.
    GetToken(String),
    SignOut,
}

impl HostCommand {
    pub const KINDS: [&'static str; 4] = ["LogError", "DeleteUser", "GetToken", "SignOut"];

    pub fn recognizes(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LogError(_) => "LogError",
            Self::DeleteUser(_) => "DeleteUser",
            Self::GetToken(_) => "GetToken",
            Self::SignOut => "SignOut",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unrecognized message kind '{msg}'")]
    UnknownKind { msg: String },
    #[error("malformed payload for message kind '{msg}': {source}")]
    BadPayload {
        msg: String,
        #[source]
        source: serde_json::Error,
    },
}

fn typed_from_envelope<T: DeserializeOwned>(
    envelope: Envelope,
    kinds: &[&str],
) -> Result<T, ProtocolError> {
    if !kinds.contains(&envelope.msg.as_str()) {
        return Err(ProtocolError::UnknownKind { msg: envelope.msg });
    }
    let msg = envelope.msg.clone();
    // Rebuild the tagged form by hand so a null payload stays visible to the
    // enum deserializer instead of being skipped.
    let mut raw = serde_json::Map::with_capacity(2);
    raw.insert("msg".to_string(), Value::String(envelope.msg));
    raw.insert("payload".to_string(), envelope.payload);
    serde_json::from_value(Value::Object(raw))
        .map_err(|source| ProtocolError::BadPayload { msg, source })
}

impl TryFrom<Envelope> for UiNotification {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        typed_from_envelope(envelope, &Self::KINDS)
    }
}

impl TryFrom<Envelope> for HostCommand {
    type Error = ProtocolError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        typed_from_envelope(envelope, &Self::KINDS)
    }
}

impl From<UiNotification> for Envelope {
    fn from(value: UiNotification) -> Self {
        let msg = value.kind();
        let payload = match value {
            UiNotification::AuthStateChanged(user) => {
                serde_json::to_value(user).unwrap_or(Value::Null)
            }
            UiNotification::UrlReceived(url) => Value::String(url),
        };
        Envelope::new(msg, payload)
    }
}

impl From<HostCommand> for Envelope {
    fn from(value: HostCommand) -> Self {
        let msg = value.kind();
        let payload = match value {
            HostCommand::LogError(payload) => payload,
            HostCommand::DeleteUser(uid) => Value::String(uid.0),
            HostCommand::GetToken(url) => Value::String(url),
            HostCommand::SignOut => Value::Null,
        };
        Envelope::new(msg, payload)
    }
}
