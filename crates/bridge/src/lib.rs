use std::{sync::Arc, thread, time::Duration};

use auth_client::{token_exchange::ExchangeRegistry, AuthProvider, AuthStateChange, Settings};
use crossbeam_channel::{bounded, Receiver, Sender};
use shared::protocol::{Envelope, UiNotification};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub mod inbound;
pub mod outbound;

pub use outbound::HostActions;

pub const COMMAND_QUEUE_CAPACITY: usize = 256;
pub const UI_QUEUE_CAPACITY: usize = 2048;

/// Both mailboxes as one bundle: commands flow UI -> host, notifications
/// flow host -> UI. Each side keeps the two ends it needs.
pub struct BridgeChannels {
    pub cmd_tx: Sender<Envelope>,
    pub cmd_rx: Receiver<Envelope>,
    pub ui_tx: Sender<Envelope>,
    pub ui_rx: Receiver<Envelope>,
}

impl BridgeChannels {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE_CAPACITY);
        let (ui_tx, ui_rx) = bounded(UI_QUEUE_CAPACITY);
        Self {
            cmd_tx,
            cmd_rx,
            ui_tx,
            ui_rx,
        }
    }
}

impl Default for BridgeChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// How the host surfaces a blocking user-facing alert. The embedding UI
/// supplies a real dialog; headless hosts fall back to [`LogOnlyAlerts`].
pub trait AlertPresenter: Send + Sync {
    /// Returns only once the user has dismissed the alert.
    fn blocking_alert(&self, message: &str);
}

pub struct LogOnlyAlerts;

impl AlertPresenter for LogOnlyAlerts {
    fn blocking_alert(&self, message: &str) {
        warn!("alert: {message}");
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to build token exchange http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bridge worker thread panicked")]
    WorkerPanicked,
}

/// The UI-facing ends of a running bridge plus its worker thread.
pub struct BridgeHandle {
    pub cmd_tx: Sender<Envelope>,
    pub ui_rx: Receiver<Envelope>,
    worker: thread::JoinHandle<()>,
}

impl BridgeHandle {
    /// Drops this handle's command sender and waits for the worker to drain
    /// the mailbox and exit. Cloned senders keep the bridge alive.
    pub fn shutdown(self) -> Result<(), BridgeError> {
        drop(self.cmd_tx);
        self.worker.join().map_err(|_| BridgeError::WorkerPanicked)
    }
}

/// Starts the bridge worker: a dedicated thread owning a tokio runtime that
/// forwards provider auth-state changes into the UI mailbox and executes
/// commands from the outbound mailbox until every sender is gone.
pub fn start_bridge(
    settings: &Settings,
    provider: Arc<dyn AuthProvider>,
    alerts: Arc<dyn AlertPresenter>,
) -> Result<BridgeHandle, BridgeError> {
    let BridgeChannels {
        cmd_tx,
        cmd_rx,
        ui_tx,
        ui_rx,
    } = BridgeChannels::new();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .build()?;
    let actions = HostActions {
        provider,
        alerts,
        http,
        registry: ExchangeRegistry::new(),
        origin: settings.app_origin.clone(),
        ui_tx: ui_tx.clone(),
    };

    let worker = thread::spawn(move || run_worker(actions, cmd_rx, ui_tx));

    Ok(BridgeHandle {
        cmd_tx,
        ui_rx,
        worker,
    })
}

fn run_worker(actions: HostActions, cmd_rx: Receiver<Envelope>, ui_tx: Sender<Envelope>) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("bridge: failed to build worker runtime: {err}");
            return;
        }
    };

    runtime.block_on(async move {
        let mut auth_events = actions.provider.subscribe_auth_state();
        let forward_tx = ui_tx.clone();
        let forward = tokio::spawn(async move {
            loop {
                match auth_events.recv().await {
                    Ok(change) => {
                        let user = match change {
                            AuthStateChange::SignedIn(user) => Some(user),
                            AuthStateChange::SignedOut => None,
                        };
                        inbound::deliver_to_ui(
                            &forward_tx,
                            UiNotification::AuthStateChanged(user).into(),
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "bridge: auth state subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        info!("bridge: worker ready");
        while let Ok(envelope) = cmd_rx.recv() {
            actions.dispatch(envelope).await;
        }

        forward.abort();
        info!("bridge: command mailbox closed; worker stopping");
    });
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
