use super::*;
use std::{sync::Mutex, time::Instant};

use async_trait::async_trait;
use auth_client::AuthError;
use axum::{routing::get, Router};
use serde_json::json;
use shared::{
    domain::{AuthUser, Uid},
    error::AuthErrorCode,
    protocol::HostCommand,
};
use tokio::net::TcpListener;

struct RecordingProvider {
    calls: Mutex<Vec<String>>,
    delete_error: Option<AuthErrorCode>,
    auth_state: broadcast::Sender<AuthStateChange>,
}

impl RecordingProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delete_error: None,
            auth_state: broadcast::channel(16).0,
        })
    }

    fn failing_delete(code: AuthErrorCode) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delete_error: Some(code),
            auth_state: broadcast::channel(16).0,
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    fn wait_for_subscriber(&self) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.auth_state.receiver_count() == 0 {
            assert!(Instant::now() < deadline, "bridge worker never subscribed");
            thread::sleep(Duration::from_millis(10));
        }
    }
}

#[async_trait]
impl AuthProvider for RecordingProvider {
    async fn sign_in_with_custom_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        self.calls
            .lock()
            .expect("calls")
            .push(format!("sign_in:{token}"));
        let user = AuthUser::new("uid-test");
        let _ = self.auth_state.send(AuthStateChange::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.calls.lock().expect("calls").push("sign_out".to_string());
        let _ = self.auth_state.send(AuthStateChange::SignedOut);
        Ok(())
    }

    async fn delete_current_user(&self) -> Result<(), AuthError> {
        self.calls.lock().expect("calls").push("delete".to_string());
        match self.delete_error {
            Some(code) => Err(AuthError::Provider {
                code,
                message: code.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn current_user(&self) -> Option<AuthUser> {
        None
    }

    fn subscribe_auth_state(&self) -> broadcast::Receiver<AuthStateChange> {
        self.auth_state.subscribe()
    }
}

#[derive(Default)]
struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("messages").clone()
    }
}

impl AlertPresenter for RecordingAlerts {
    fn blocking_alert(&self, message: &str) {
        self.messages
            .lock()
            .expect("messages")
            .push(message.to_string());
    }
}

fn start_test_bridge(
    provider: Arc<RecordingProvider>,
    alerts: Arc<RecordingAlerts>,
) -> BridgeHandle {
    start_bridge(&Settings::default(), provider, alerts).expect("start bridge")
}

#[test]
fn inbound_payloads_reach_the_ui_unchanged() {
    let channels = BridgeChannels::new();
    let payload = json!({"uid": "u-1", "nested": {"keep": [1, 2, 3]}});
    let envelope = Envelope::new("OnAuthStateChanged", payload.clone());

    inbound::deliver_to_ui(&channels.ui_tx, envelope.clone());

    let delivered = channels
        .ui_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("delivered");
    assert_eq!(delivered, envelope);
    assert_eq!(delivered.payload, payload);
}

#[test]
fn unrecognized_inbound_kind_is_dropped() {
    let channels = BridgeChannels::new();
    inbound::deliver_to_ui(&channels.ui_tx, Envelope::new("Telemetry", json!({"x": 1})));
    assert!(channels.ui_rx.try_recv().is_err());
}

#[test]
fn navigate_appends_path_to_the_origin() {
    let channels = BridgeChannels::new();
    inbound::navigate(&channels.ui_tx, "http://localhost:8080", None);
    inbound::navigate(&channels.ui_tx, "http://localhost:8080", Some("/account"));

    let bare = channels
        .ui_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("origin only");
    assert_eq!(bare.msg, "UrlReceived");
    assert_eq!(bare.payload, json!("http://localhost:8080"));

    let with_path = channels
        .ui_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("with path");
    assert_eq!(with_path.payload, json!("http://localhost:8080/account"));
}

#[test]
fn unrecognized_command_kind_executes_no_host_action() {
    let provider = RecordingProvider::new();
    let alerts = Arc::new(RecordingAlerts::default());
    let handle = start_test_bridge(provider.clone(), alerts.clone());

    handle
        .cmd_tx
        .try_send(Envelope::new("FormatDisk", json!({"depth": 3})))
        .expect("queue");
    handle.shutdown().expect("shutdown");

    assert!(provider.calls().is_empty());
    assert!(alerts.messages().is_empty());
}

#[test]
fn sign_out_wire_forms_reach_the_provider() {
    let provider = RecordingProvider::new();
    let handle = start_test_bridge(provider.clone(), Arc::new(RecordingAlerts::default()));

    handle
        .cmd_tx
        .try_send(HostCommand::SignOut.into())
        .expect("queue typed form");
    // Senders that never materialize the payload key are equally valid.
    let bare: Envelope = serde_json::from_value(json!({"msg": "SignOut"})).expect("bare form");
    handle.cmd_tx.try_send(bare).expect("queue bare form");
    handle.shutdown().expect("shutdown");

    assert_eq!(
        provider.calls(),
        vec!["sign_out".to_string(), "sign_out".to_string()]
    );
}

#[test]
fn stale_credential_delete_alerts_and_forces_sign_out() {
    let provider = RecordingProvider::failing_delete(AuthErrorCode::RequiresRecentLogin);
    let alerts = Arc::new(RecordingAlerts::default());
    let handle = start_test_bridge(provider.clone(), alerts.clone());

    handle
        .cmd_tx
        .try_send(HostCommand::DeleteUser(Uid::from("u-1")).into())
        .expect("queue");
    handle.shutdown().expect("shutdown");

    assert_eq!(
        provider.calls(),
        vec!["delete".to_string(), "sign_out".to_string()]
    );
    assert_eq!(
        alerts.messages(),
        vec![outbound::STALE_LOGIN_ALERT.to_string()]
    );
}

#[test]
fn other_delete_failures_never_force_sign_out() {
    let provider = RecordingProvider::failing_delete(AuthErrorCode::UserNotFound);
    let alerts = Arc::new(RecordingAlerts::default());
    let handle = start_test_bridge(provider.clone(), alerts.clone());

    handle
        .cmd_tx
        .try_send(HostCommand::DeleteUser(Uid::from("u-1")).into())
        .expect("queue");
    handle.shutdown().expect("shutdown");

    assert_eq!(provider.calls(), vec!["delete".to_string()]);
    assert!(alerts.messages().is_empty());
}

#[test]
fn auth_state_changes_flow_into_the_ui_mailbox() {
    let provider = RecordingProvider::new();
    let handle = start_test_bridge(provider.clone(), Arc::new(RecordingAlerts::default()));
    provider.wait_for_subscriber();

    let _ = provider
        .auth_state
        .send(AuthStateChange::SignedIn(AuthUser::new("u-7")));
    let _ = provider.auth_state.send(AuthStateChange::SignedOut);

    let signed_in = handle
        .ui_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("signed in");
    assert_eq!(signed_in.msg, "OnAuthStateChanged");
    assert_eq!(signed_in.payload["uid"], "u-7");

    let signed_out = handle
        .ui_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("signed out");
    assert_eq!(signed_out.msg, "OnAuthStateChanged");
    assert!(signed_out.payload.is_null());

    handle.shutdown().expect("shutdown");
}

async fn spawn_token_server(body: &'static str) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/token", get(move || async move { body }));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/token?callback=signIn")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_exchange_signs_in_and_navigates_to_the_origin() {
    let url = spawn_token_server(r#"signIn({"token":"abc"});"#).await;
    let provider = RecordingProvider::new();
    let handle = start_test_bridge(provider.clone(), Arc::new(RecordingAlerts::default()));

    handle
        .cmd_tx
        .try_send(HostCommand::GetToken(url).into())
        .expect("queue");

    // Blocking receives run on a helper thread so the server task stays live.
    let ui_rx = handle.ui_rx.clone();
    let provider_at_navigation = provider.clone();
    let (collected, calls_at_navigation) = tokio::task::spawn_blocking(move || {
        let mut seen: Vec<Envelope> = Vec::new();
        let mut calls_at_navigation: Option<Vec<String>> = None;
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let have_url = seen.iter().any(|e| e.msg == "UrlReceived");
            let have_auth = seen.iter().any(|e| e.msg == "OnAuthStateChanged");
            if have_url && have_auth {
                break;
            }
            if let Ok(envelope) = ui_rx.recv_timeout(Duration::from_millis(200)) {
                if envelope.msg == "UrlReceived" && calls_at_navigation.is_none() {
                    calls_at_navigation = Some(provider_at_navigation.calls());
                }
                seen.push(envelope);
            }
        }
        (seen, calls_at_navigation)
    })
    .await
    .expect("collector");

    let navigation = collected
        .iter()
        .find(|e| e.msg == "UrlReceived")
        .expect("navigation message");
    assert_eq!(navigation.payload, json!(Settings::default().app_origin));
    assert!(collected
        .iter()
        .any(|e| e.msg == "OnAuthStateChanged" && e.payload["uid"] == "uid-test"));
    // Navigation is the last step: the sign-in call was already recorded
    // when the UrlReceived message came out.
    assert_eq!(
        calls_at_navigation.expect("navigation message"),
        vec!["sign_in:abc".to_string()]
    );
    assert_eq!(provider.calls(), vec!["sign_in:abc".to_string()]);

    tokio::task::spawn_blocking(move || handle.shutdown().expect("shutdown"))
        .await
        .expect("join");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_exchange_without_a_token_makes_no_sign_in_call() {
    let url = spawn_token_server(r#"signIn({"error":"session expired"});"#).await;
    let provider = RecordingProvider::new();
    let handle = start_test_bridge(provider.clone(), Arc::new(RecordingAlerts::default()));

    handle
        .cmd_tx
        .try_send(HostCommand::GetToken(url).into())
        .expect("queue");

    let ui_rx = handle.ui_rx.clone();
    tokio::task::spawn_blocking(move || handle.shutdown().expect("shutdown"))
        .await
        .expect("join");

    assert!(provider.calls().is_empty());
    assert!(ui_rx.try_recv().is_err());
}
