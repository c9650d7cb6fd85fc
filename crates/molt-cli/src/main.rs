//! # molt-cli
//!
//! Headless consumer of the gateway client engine: connect, inspect
//! sessions/agents/models, chat, and tail logs from a terminal.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use molt_link::{ConnectionStatus, Credentials, FileCredentialStore, GatewayClient};
use tracing_subscriber::EnvFilter;

/// Molt gateway client.
#[derive(Parser, Debug)]
#[command(name = "molt", about = "Gateway client for agent sessions")]
struct Cli {
    /// Gateway endpoint override (otherwise credentials/settings decide).
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the gateway endpoint and token, then verify the handshake.
    Login {
        /// Gateway endpoint, e.g. `ws://127.0.0.1:18789`.
        #[arg(long)]
        url: String,
        /// Gateway auth token.
        #[arg(long)]
        token: String,
    },
    /// Gateway health and status summary.
    Status,
    /// List sessions.
    Sessions,
    /// List agents.
    Agents,
    /// List models.
    Models,
    /// Send a chat message and stream the reply.
    Chat {
        /// Message text.
        message: String,
        /// Target session key (gateway default when omitted).
        #[arg(long)]
        session: Option<String>,
    },
    /// Tail gateway logs.
    Tail {
        /// How many recent lines to fetch before following.
        #[arg(long, default_value = "100")]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let settings = molt_settings::load_settings().context("failed to load settings")?;
    let store = FileCredentialStore::default_location();
    let client = GatewayClient::new(settings, store);

    if let Some(url) = args.url {
        let mut credentials = client.credentials();
        credentials.endpoint = Some(url);
        // Endpoint override for this invocation only; not persisted.
        client.set_credentials(credentials);
    }

    match args.command {
        Command::Login { url, token } => login(&client, url, token).await,
        Command::Status => status(&client).await,
        Command::Sessions => sessions(&client).await,
        Command::Agents => agents(&client).await,
        Command::Models => models(&client).await,
        Command::Chat { message, session } => chat(&client, &message, session.as_deref()).await,
        Command::Tail { limit } => tail(&client, limit).await,
    }
}

/// Connect and block until the handshake settles.
async fn connect_and_wait(client: &GatewayClient) -> Result<()> {
    client.connect().await.context("failed to open socket")?;

    let mut watch = client.status_watch();
    let settled = tokio::time::timeout(
        Duration::from_secs(15),
        watch.wait_for(|status| {
            matches!(
                status,
                ConnectionStatus::Connected | ConnectionStatus::Rejected(_)
            )
        }),
    )
    .await
    .context("timed out waiting for the gateway handshake")?
    .context("client shut down while connecting")?;

    if let ConnectionStatus::Rejected(reason) = &*settled {
        bail!("gateway rejected the handshake: {reason}");
    }
    Ok(())
}

async fn login(client: &GatewayClient, url: String, token: String) -> Result<()> {
    let credentials = Credentials {
        endpoint: Some(url),
        token: Some(token),
        ..client.credentials()
    };
    client
        .save_credentials(credentials)
        .context("failed to persist credentials")?;

    connect_and_wait(client).await?;
    println!("connected — credentials saved");
    client.shutdown();
    Ok(())
}

async fn status(client: &GatewayClient) -> Result<()> {
    connect_and_wait(client).await?;
    let health = client.health().await?;
    let info = client.status_info().await?;
    println!("health: {}", serde_json::to_string_pretty(&health)?);
    println!("status: {}", serde_json::to_string_pretty(&info)?);
    client.shutdown();
    Ok(())
}

async fn sessions(client: &GatewayClient) -> Result<()> {
    connect_and_wait(client).await?;
    let payload = client.sessions_list().await?;
    if payload.sessions.is_empty() {
        println!("no sessions");
    }
    for session in &payload.sessions {
        println!(
            "{}  {}",
            session.label(),
            session.agent_id.as_deref().unwrap_or("-")
        );
    }
    client.shutdown();
    Ok(())
}

async fn agents(client: &GatewayClient) -> Result<()> {
    connect_and_wait(client).await?;
    let payload = client.agents_list().await?;
    if payload.agents.is_empty() {
        println!("no agents");
    }
    for agent in &payload.agents {
        let marker = if agent.default { "*" } else { " " };
        println!(
            "{marker} {}  {}",
            agent.id,
            agent.model.as_deref().unwrap_or("-")
        );
    }
    client.shutdown();
    Ok(())
}

async fn models(client: &GatewayClient) -> Result<()> {
    connect_and_wait(client).await?;
    let payload = client.models_list().await?;
    if payload.models.is_empty() {
        println!("no models");
    }
    for model in &payload.models {
        println!("{}  {}", model.id, model.provider.as_deref().unwrap_or("-"));
    }
    client.shutdown();
    Ok(())
}

async fn chat(client: &GatewayClient, message: &str, session: Option<&str>) -> Result<()> {
    // Subscribe before sending so no delta can slip past.
    let (_subscription, mut deltas) = client.subscribe("agent");
    connect_and_wait(client).await?;
    let _accepted = client.chat_send(session, message).await?;

    loop {
        let payload = tokio::time::timeout(Duration::from_secs(120), deltas.recv())
            .await
            .context("timed out waiting for the reply")?
            .context("engine shut down mid-reply")?;

        if let Some(text) = payload
            .get("text")
            .or_else(|| payload.get("delta"))
            .or_else(|| payload.get("content"))
            .and_then(|v| v.as_str())
        {
            use std::io::Write;
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        let completed = payload.get("summary").is_some()
            || payload.get("status").and_then(|v| v.as_str()) == Some("completed");
        if completed {
            println!();
            break;
        }
    }
    client.shutdown();
    Ok(())
}

async fn tail(client: &GatewayClient, limit: u64) -> Result<()> {
    let (_subscription, mut lines) = client.subscribe("log");
    connect_and_wait(client).await?;

    if let Ok(recent) = client.logs_tail(Some(limit)).await {
        if let Some(existing) = recent.get("lines").and_then(|v| v.as_array()) {
            for line in existing {
                println!("{}", line.as_str().unwrap_or_default());
            }
        }
    }

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(payload) => match payload.as_str() {
                    Some(text) => println!("{text}"),
                    None => println!("{payload}"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.shutdown();
    Ok(())
}
