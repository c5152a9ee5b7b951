use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

const PUBLIC_IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

/// Auth-provider connection parameters supplied at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub database_url: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    /// Endpoint base override for emulators and tests.
    pub identity_url: Option<String>,
    /// Origin navigation messages point the UI back at.
    pub app_origin: String,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: "devkey".into(),
            auth_domain: "localhost".into(),
            project_id: "gangway-dev".into(),
            database_url: None,
            storage_bucket: None,
            messaging_sender_id: None,
            identity_url: None,
            app_origin: "http://localhost:8080".into(),
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn identity_base(&self) -> String {
        self.identity_url
            .clone()
            .unwrap_or_else(|| PUBLIC_IDENTITY_BASE.to_string())
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = std::fs::read_to_string("gangway.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("api_key") {
                settings.api_key = v.clone();
            }
            if let Some(v) = file_cfg.get("auth_domain") {
                settings.auth_domain = v.clone();
            }
            if let Some(v) = file_cfg.get("project_id") {
                settings.project_id = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("storage_bucket") {
                settings.storage_bucket = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("messaging_sender_id") {
                settings.messaging_sender_id = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("identity_url") {
                settings.identity_url = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("app_origin") {
                settings.app_origin = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("AUTH_API_KEY") {
        settings.api_key = v;
    }
    if let Ok(v) = std::env::var("APP__API_KEY") {
        settings.api_key = v;
    }

    if let Ok(v) = std::env::var("AUTH_DOMAIN") {
        settings.auth_domain = v;
    }
    if let Ok(v) = std::env::var("APP__AUTH_DOMAIN") {
        settings.auth_domain = v;
    }

    if let Ok(v) = std::env::var("APP__PROJECT_ID") {
        settings.project_id = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__STORAGE_BUCKET") {
        settings.storage_bucket = Some(v);
    }
    if let Ok(v) = std::env::var("APP__MESSAGING_SENDER_ID") {
        settings.messaging_sender_id = Some(v);
    }

    if let Ok(v) = std::env::var("IDENTITY_URL") {
        settings.identity_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__IDENTITY_URL") {
        settings.identity_url = Some(v);
    }

    if let Ok(v) = std::env::var("APP_ORIGIN") {
        settings.app_origin = v;
    }
    if let Ok(v) = std::env::var("APP__APP_ORIGIN") {
        settings.app_origin = v;
    }

    if let Ok(v) = std::env::var("APP__HTTP_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.http_timeout_secs = parsed;
        }
    }

    if let Some(origin) = normalize_origin(&settings.app_origin) {
        settings.app_origin = origin;
    }

    settings
}

/// Reduces a configured origin to `scheme://host[:port]`, dropping any path
/// or trailing slash. Returns `None` for values that are not http(s) URLs.
pub fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(origin.ascii_serialization())
}
