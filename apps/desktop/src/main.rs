//! Console host for the auth bridge.
//!
//! Stands in for the embedding shell: UI-bound messages are printed to
//! stdout as JSON, host commands are typed on stdin one per line.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use auth_client::{load_settings, IdentityClient};
use bridge::{start_bridge, LogOnlyAlerts};
use clap::Parser;
use serde_json::Value;
use shared::domain::Uid;
use shared::protocol::{Envelope, HostCommand};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Print UI-bound messages as compact JSON instead of pretty JSON.
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let settings = load_settings();
    info!(origin = %settings.app_origin, "desktop: starting auth bridge host");

    let provider = IdentityClient::new(&settings)?;
    let handle = start_bridge(&settings, provider, Arc::new(LogOnlyAlerts))?;

    let ui_rx = handle.ui_rx.clone();
    let compact = args.compact;
    let printer = thread::spawn(move || {
        while let Ok(envelope) = ui_rx.recv() {
            let rendered = if compact {
                serde_json::to_string(&envelope)
            } else {
                serde_json::to_string_pretty(&envelope)
            };
            match rendered {
                Ok(text) => println!("ui <- {text}"),
                Err(err) => error!("desktop: failed to render ui message: {err}"),
            }
        }
    });

    println!("commands: signout | delete <uid> | gettoken <url> | logerror <text> | quit");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match parse_command(line) {
            Some(envelope) => {
                if handle.cmd_tx.try_send(envelope).is_err() {
                    warn!("desktop: command mailbox is full or closed");
                }
            }
            None => {
                eprintln!("unknown command: {line}");
            }
        }
    }

    handle.shutdown()?;
    // The worker dropped its ui senders, so the printer drains and exits.
    if printer.join().is_err() {
        error!("desktop: printer thread panicked");
    }
    Ok(())
}

fn parse_command(line: &str) -> Option<Envelope> {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb {
        "signout" => HostCommand::SignOut,
        "delete" if !rest.is_empty() => HostCommand::DeleteUser(Uid::from(rest)),
        "gettoken" if !rest.is_empty() => HostCommand::GetToken(rest.to_string()),
        "logerror" if !rest.is_empty() => {
            let payload = serde_json::from_str(rest).unwrap_or(Value::String(rest.to_string()));
            HostCommand::LogError(payload)
        }
        _ => return None,
    };
    Some(command.into())
}
