use anyhow::{Context as _, Result};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use heliograph::client::{Client, ClientEvent, GatewayConfig};
use heliograph::dispatch::{Delivery, DispatchKey, EventDispatcher, HandlerRegistry};
use heliograph_types::{GuildId, Intents};

use serde_json::value::RawValue;

#[tokio::main]
async fn main() -> Result<()> {
    let token = dotenvy::var("TOKEN").context("Missing `TOKEN` environment variable")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut registry = HandlerRegistry::new();
    registry.register("MESSAGE_CREATE", |data: &RawValue| {
        let message: serde_json::Value = serde_json::from_str(data.get())?;
        let guild = message["guild_id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .map_or(DispatchKey::Global, |id| {
                DispatchKey::Guild(GuildId::new(id))
            });

        Ok(vec![Delivery::new(guild, move || {
            info!(
                author = message["author"]["username"].as_str().unwrap_or("?"),
                content = message["content"].as_str().unwrap_or(""),
                "message created",
            );
        })])
    });

    let workers = std::thread::available_parallelism().map_or(4, usize::from);
    let config = GatewayConfig::new(
        "gateway.discord.gg",
        token,
        Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
    );
    let mut client = Client::new(config, registry, EventDispatcher::new(workers));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("ctrl+c detected, closing the connection...");
                client.close();
            },
            event = client.next() => {
                match event {
                    Some(Ok(ClientEvent::Ready)) => info!("session is ready"),
                    Some(Ok(ClientEvent::Resumed)) => info!("session resumed"),
                    Some(Ok(ClientEvent::Reconnecting)) => warn!("reconnecting..."),
                    Some(Ok(ClientEvent::Closed(frame))) => warn!(?frame, "connection closed"),
                    Some(Err(error)) => warn!(?error, "got an error"),
                    None => break,
                }
            },
        }
    }

    client.shutdown().await;
    Ok(())
}
