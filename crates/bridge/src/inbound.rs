//! Host -> UI delivery. Payloads cross this path untouched.

use crossbeam_channel::{Sender, TrySendError};
use shared::protocol::{Envelope, UiNotification};
use tracing::{debug, error, warn};

/// Delivers one inbound message to the UI mailbox. An unrecognized kind is a
/// programming error on the host side: logged, dropped, never fatal.
pub fn deliver_to_ui(ui_tx: &Sender<Envelope>, envelope: Envelope) {
    if !UiNotification::recognizes(&envelope.msg) {
        error!(kind = %envelope.msg, "bridge: unrecognized inbound message kind");
        return;
    }
    match ui_tx.try_send(envelope) {
        Ok(()) => {}
        Err(TrySendError::Full(envelope)) => {
            warn!(kind = %envelope.msg, "bridge: ui mailbox is full; dropping message");
        }
        Err(TrySendError::Disconnected(envelope)) => {
            debug!(kind = %envelope.msg, "bridge: ui mailbox disconnected");
        }
    }
}

/// Points the UI back at the configured origin, with `path` appended when
/// given.
pub fn navigate(ui_tx: &Sender<Envelope>, origin: &str, path: Option<&str>) {
    let url = match path {
        Some(path) => format!("{origin}{path}"),
        None => origin.to_string(),
    };
    deliver_to_ui(ui_tx, UiNotification::UrlReceived(url).into());
}
