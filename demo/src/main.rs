//! TurboWS demo binary.
//!
//! ```text
//! turbows-demo serve --bind 127.0.0.1:9001
//! turbows-demo send --url ws://127.0.0.1:9001/rooms/lobby "hello"
//! ```

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turbows_core::{
    Application, ClientEndpointConfig, ClientEngine, EndpointHandler, EngineConfig,
    HandlerResult, Session, WebSocketEngine,
};
use turbows_tcp::{WebSocketClient, WebSocketServer};
use turbows_transport_traits::{CloseReason, TimeoutConfig};

use crate::cli::{Cli, Commands};

struct Echo;

impl EndpointHandler for Echo {
    fn on_text(&mut self, session: &Session, text: String) -> HandlerResult {
        session.send_text(text)?;
        Ok(())
    }

    fn on_binary(&mut self, session: &Session, data: Bytes) -> HandlerResult {
        session.send_binary(data)?;
        Ok(())
    }
}

/// Replies with the message prefixed by the room taken from the path.
struct Room {
    name: String,
}

impl EndpointHandler for Room {
    fn on_open(&mut self, session: &Session) -> HandlerResult {
        info!(room = %self.name, session = session.id(), "joined");
        Ok(())
    }

    fn on_text(&mut self, session: &Session, text: String) -> HandlerResult {
        session.send_text(format!("[{}] {text}", self.name))?;
        Ok(())
    }
}

/// Forwards the first reply to the waiting `send` command.
struct Reply(mpsc::UnboundedSender<String>);

impl EndpointHandler for Reply {
    fn on_text(&mut self, _session: &Session, text: String) -> HandlerResult {
        self.0.send(text)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { bind, config } => serve(bind, config).await,
        Commands::Send {
            url,
            version,
            subprotocols,
            message,
        } => send(url, version.into(), subprotocols, message).await,
    }
}

async fn serve(bind: std::net::SocketAddr, config: Option<std::path::PathBuf>) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let engine = Arc::new(WebSocketEngine::new(config));
    engine.register(
        Application::builder("/echo")
            .handler(|_| Box::new(Echo))
            .build()?,
    )?;
    engine.register(
        Application::builder("/rooms/{room}")
            .subprotocols(["chat"])
            .handler(|request| {
                Box::new(Room {
                    name: request.path_parameter("room").unwrap_or("lobby").to_string(),
                })
            })
            .build()?,
    )?;

    let server =
        WebSocketServer::bind(bind, Arc::clone(&engine), TimeoutConfig::default()).await?;
    let server = Arc::new(server);
    info!(addr = %server.local_addr()?, "serving /echo and /rooms/{{room}}");

    let running = Arc::clone(&server);
    let run = tokio::spawn(async move { running.run().await });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    server.shutdown();
    run.await??;
    engine.shutdown();
    Ok(())
}

async fn send(
    url: url::Url,
    version: turbows_protocol::ProtocolVersion,
    subprotocols: Vec<String>,
    message: String,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ClientEngine::new(
        ClientEndpointConfig::new()
            .version(version)
            .subprotocols(subprotocols),
        Box::new(Reply(tx)),
        EngineConfig::default(),
    );

    let connection = WebSocketClient::connect(&url, engine, TimeoutConfig::fast()).await?;
    info!(
        version = %connection.session().version(),
        subprotocol = connection.session().subprotocol().unwrap_or("-"),
        "connected"
    );
    connection.session().send_text(message)?;

    let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .context("no reply within 5s")?
        .context("connection closed before replying")?;
    println!("{reply}");

    connection.close(CloseReason::normal());
    connection.closed().await;
    Ok(())
}
