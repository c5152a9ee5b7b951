//! Token fetch against legacy endpoints that still speak the JSONP wire
//! convention: the URL names a callback via `callback=<name>`, and the body
//! may arrive wrapped as `<name>({ ... });`. The script-tag mechanics are
//! gone; this is a plain HTTP GET that unwraps the envelope itself.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Value;
use shared::domain::TokenGrant;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token exchange url is not parseable: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("token exchange url is missing a callback=<name> query parameter")]
    MissingCallback,
    #[error("a token exchange named '{name}' is already in flight")]
    AlreadyInFlight { name: String },
    #[error("token exchange transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token exchange response is neither JSON nor a '{name}(..)' envelope")]
    MalformedBody { name: String },
    #[error("token exchange response carries no token: {payload}")]
    MissingToken { payload: Value },
}

/// Extracts the callback name the exchange URL designates.
pub fn callback_name(url: &str) -> Result<String, ExchangeError> {
    let parsed = Url::parse(url)?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "callback")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or(ExchangeError::MissingCallback)
}

/// In-flight callback names. An entry exists exactly for the duration of one
/// exchange; reusing a name while its exchange is unresolved is rejected.
#[derive(Clone, Debug, Default)]
pub struct ExchangeRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) -> Result<RegistrationGuard, ExchangeError> {
        let mut names = self.lock();
        if !names.insert(name.to_string()) {
            return Err(ExchangeError::AlreadyInFlight {
                name: name.to_string(),
            });
        }
        Ok(RegistrationGuard {
            registry: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its callback name when the exchange resolves, success or failure.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: ExchangeRegistry,
    name: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

/// Runs one exchange: validate the URL, claim the callback name, fetch, and
/// unwrap the grant. The name is released on return, whatever the outcome.
pub async fn fetch_token(
    http: &reqwest::Client,
    registry: &ExchangeRegistry,
    url: &str,
) -> Result<TokenGrant, ExchangeError> {
    let name = callback_name(url)?;
    let _registration = registry.register(&name)?;

    let body = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let payload = parse_exchange_body(&name, &body)?;
    grant_from_payload(payload)
}

fn parse_exchange_body(name: &str, body: &str) -> Result<Value, ExchangeError> {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let inner = trimmed
        .strip_prefix(name)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .map(str::trim_end)
        .map(|rest| rest.strip_suffix(';').map(str::trim_end).unwrap_or(rest))
        .and_then(|rest| rest.strip_suffix(')'));

    let inner = inner.ok_or_else(|| ExchangeError::MalformedBody {
        name: name.to_string(),
    })?;
    serde_json::from_str(inner).map_err(|_| ExchangeError::MalformedBody {
        name: name.to_string(),
    })
}

fn grant_from_payload(payload: Value) -> Result<TokenGrant, ExchangeError> {
    match payload.get("token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(TokenGrant {
            token: token.to_string(),
        }),
        _ => Err(ExchangeError::MissingToken { payload }),
    }
}

#[cfg(test)]
#[path = "tests/token_exchange_tests.rs"]
mod tests;
