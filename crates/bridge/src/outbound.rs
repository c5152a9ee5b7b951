//! UI -> host command execution.

use std::sync::Arc;

use auth_client::{
    token_exchange::{self, ExchangeRegistry},
    AuthProvider,
};
use crossbeam_channel::Sender;
use serde_json::Value;
use shared::{
    domain::Uid,
    protocol::{Envelope, HostCommand},
};
use tracing::{error, info};

use crate::{inbound, AlertPresenter};

pub(crate) const STALE_LOGIN_ALERT: &str =
    "You need to have recently signed-in to delete your account. Please sign-in and try again.";

/// Everything the outbound dispatcher needs to execute a command.
pub struct HostActions {
    pub(crate) provider: Arc<dyn AuthProvider>,
    pub(crate) alerts: Arc<dyn AlertPresenter>,
    pub(crate) http: reqwest::Client,
    pub(crate) registry: ExchangeRegistry,
    pub(crate) origin: String,
    pub(crate) ui_tx: Sender<Envelope>,
}

impl HostActions {
    /// Executes one command from the outbound mailbox. Unrecognized kinds and
    /// malformed payloads are logged and dropped; nothing here is fatal.
    pub async fn dispatch(&self, envelope: Envelope) {
        if !HostCommand::recognizes(&envelope.msg) {
            error!(kind = %envelope.msg, "bridge: unrecognized command kind");
            return;
        }
        let command = match HostCommand::try_from(envelope) {
            Ok(command) => command,
            Err(err) => {
                error!("bridge: dropping command: {err}");
                return;
            }
        };

        match command {
            HostCommand::LogError(payload) => self.log_error(payload),
            HostCommand::SignOut => self.sign_out().await,
            HostCommand::DeleteUser(uid) => self.delete_user(&uid).await,
            HostCommand::GetToken(url) => self.exchange_token(&url).await,
        }
    }

    fn log_error(&self, payload: Value) {
        error!("ui: {payload}");
    }

    async fn sign_out(&self) {
        info!("bridge: sign_out");
        if let Err(err) = self.provider.sign_out().await {
            error!("bridge: sign_out failed (unhandled): {err}");
        }
    }

    /// Deletion always targets the current session; the uid travels along for
    /// diagnostics only.
    async fn delete_user(&self, uid: &Uid) {
        info!(uid = %uid, "bridge: delete_user");
        match self.provider.delete_current_user().await {
            Ok(()) => {
                info!(uid = %uid, "bridge: account deleted");
            }
            Err(err) if err.requires_recent_login() => {
                self.alerts.blocking_alert(STALE_LOGIN_ALERT);
                if let Err(err) = self.provider.sign_out().await {
                    error!("bridge: forced sign_out after stale-credential delete failed: {err}");
                }
            }
            Err(err) => {
                error!(uid = %uid, "bridge: delete_user failed (unhandled): {err}");
            }
        }
    }

    async fn exchange_token(&self, url: &str) {
        let grant = match token_exchange::fetch_token(&self.http, &self.registry, url).await {
            Ok(grant) => grant,
            Err(err) => {
                error!("bridge: token exchange failed: {err}");
                return;
            }
        };

        match self.provider.sign_in_with_custom_token(&grant.token).await {
            Ok(user) => {
                info!(uid = %user.uid, "bridge: token sign-in complete");
                inbound::navigate(&self.ui_tx, &self.origin, None);
            }
            Err(err) => {
                error!("bridge: sign-in after token exchange failed: {err}");
            }
        }
    }
}
