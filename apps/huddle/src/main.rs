use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use huddle_sync_core::protocol::{MessageContent, Topic};
use huddle_sync_core::telemetry::logging::{self, LogConfig, LogLevel};
use huddle_sync_core::transport::ConnectionStatus;
use huddle_sync_core::{Config, SyncSession};

#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Tail a study group chat and its notifications")]
struct Cli {
    /// Bearer token for the backend
    #[arg(long, env = "HUDDLE_TOKEN")]
    token: String,

    /// Numeric id of the authenticated user (account topic)
    #[arg(long)]
    user: u64,

    /// Group chat to tail
    #[arg(long, short = 'g')]
    group: Option<u64>,

    /// Send one message to the group and keep tailing
    #[arg(long, short = 'm', requires = "group")]
    message: Option<String>,

    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    ws_url: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })?;

    let mut config = Config::from_env();
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }

    let session = SyncSession::connect(&config, &cli.token);
    session.subscribe(Topic::Account(cli.user)).await;

    let mut messages = match cli.group {
        Some(group) => {
            let topic = Topic::Group(group);
            let receiver = session.subscribe(topic).await;
            for msg in session.load_history(topic).await? {
                print_message(&msg);
            }
            Some(receiver)
        }
        None => None,
    };

    let mut status = session.status();
    let mut sent_pending = cli.message.clone();

    loop {
        tokio::select! {
            maybe = recv_message(&mut messages) => {
                match maybe {
                    Some(msg) => print_message(&msg),
                    None => break,
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                eprintln!("[status] {current:?}");
                match current {
                    ConnectionStatus::Connected { .. } => {
                        // Flush the one-shot message once we are live.
                        if let (Some(body), Some(group)) = (sent_pending.take(), cli.group) {
                            session
                                .send(Topic::Group(group), MessageContent::Text { body })
                                .await?;
                        }
                        session.refresh();
                        let state = session.notification_state().await;
                        eprintln!("[notifications] {} unread", state.unread);
                    }
                    ConnectionStatus::Lost => {
                        eprintln!("connection lost, giving up");
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn recv_message(
    receiver: &mut Option<tokio::sync::broadcast::Receiver<huddle_sync_core::protocol::ChatMessage>>,
) -> Option<huddle_sync_core::protocol::ChatMessage> {
    match receiver {
        Some(rx) => rx.recv().await.ok(),
        None => std::future::pending().await,
    }
}

fn print_message(msg: &huddle_sync_core::protocol::ChatMessage) {
    match &msg.content {
        MessageContent::Text { body } => {
            println!("[{}] {}: {}", msg.sent_at.format("%H:%M:%S"), msg.sender, body);
        }
        MessageContent::Attachment { name, url, .. } => {
            println!(
                "[{}] {}: [file] {} <{}>",
                msg.sent_at.format("%H:%M:%S"),
                msg.sender,
                name,
                url
            );
        }
    }
}
