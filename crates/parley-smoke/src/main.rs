//! Parley smoke client.
//!
//! Signs in, opens one chat, optionally sends a message, and logs every
//! state change until interrupted.
//!
//! # Usage
//!
//! ```bash
//! parley-smoke --user-id 7 --chat-id 42 --token "$TOKEN"
//!
//! # Send a message and exit after 10 seconds
//! parley-smoke --user-id 7 --chat-id 42 --send "hello" --duration 10
//! ```

use std::time::Duration;

use clap::Parser;
use parley_client::{
    ClientConfig, ClientEvent, Draft, Runtime,
    transport::{Notice, TransportConfig, WsDriver, WsHandle},
};
use parley_core::SystemEnv;
use parley_proto::{ChatId, UserId};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley smoke client
#[derive(Parser, Debug)]
#[command(name = "parley-smoke")]
#[command(about = "Connect to a Parley chat server and watch one chat")]
#[command(version)]
struct Args {
    /// Realtime endpoint
    #[arg(long, env = "PARLEY_SOCKET_URL", default_value = "ws://localhost:3000")]
    socket_url: String,

    /// REST base for history
    #[arg(long, env = "PARLEY_API_URL", default_value = "http://localhost:3000/api")]
    api_url: String,

    /// Bearer token for REST calls
    #[arg(long, env = "PARLEY_TOKEN")]
    token: Option<String>,

    /// Signed-in user
    #[arg(long, env = "PARLEY_USER_ID")]
    user_id: UserId,

    /// Chat to open
    #[arg(long, env = "PARLEY_CHAT_ID")]
    chat_id: ChatId,

    /// Message to send once the chat is open
    #[arg(long)]
    send: Option<String>,

    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    info!(socket = %args.socket_url, api = %args.api_url, "parley smoke client starting");
    if args.token.is_none() {
        warn!("no bearer token; history requests will fail");
    }

    let config = TransportConfig {
        socket_url: args.socket_url.clone(),
        api_base_url: args.api_url.clone(),
        token: args.token.clone(),
        ..TransportConfig::default()
    };
    let (driver, handle, notices) = WsDriver::new(config);
    let runtime = Runtime::new(driver, SystemEnv::new(), ClientConfig::default());

    let logger = tokio::spawn(log_notices(notices));
    let script = tokio::spawn(script(handle, args));

    runtime.run().await?;
    script.await??;
    logger.abort();

    info!("parley smoke client stopped");
    Ok(())
}

async fn script(handle: WsHandle, args: Args) -> Result<(), parley_client::transport::TransportError> {
    handle.submit(ClientEvent::SignIn { user_id: args.user_id }).await?;
    handle.submit(ClientEvent::OpenChat { chat_id: args.chat_id }).await?;

    if let Some(text) = args.send {
        // Give the handshake a moment; sends before it complete fail locally.
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.submit(ClientEvent::SendMessage { chat_id: args.chat_id, draft: Draft::text(text) }).await?;
    }

    match args.duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "ctrl-c handler failed");
            }
        },
    }

    info!("signing out");
    handle.submit(ClientEvent::SignOut).await?;
    handle.shutdown().await
}

async fn log_notices(mut notices: UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            Notice::Lifecycle(event) => info!(?event, "connection"),
            Notice::Session(snapshot) => {
                let newest = snapshot.messages.first().map(|m| m.content.as_str()).unwrap_or_default();
                info!(
                    chat_id = snapshot.chat_id,
                    messages = snapshot.messages.len(),
                    typing = ?snapshot.typing_users,
                    loading = snapshot.loading,
                    error = snapshot.error.as_deref().unwrap_or_default(),
                    newest,
                    "chat updated"
                );
            },
            Notice::Presence(presence) => {
                info!(user_id = presence.user_id, online = presence.is_online, "presence");
            },
        }
    }
}
