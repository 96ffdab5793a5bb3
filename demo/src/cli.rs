//! Command line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use turbows_protocol::ProtocolVersion;

/// TurboWS demo: an echo server and a one-shot client.
#[derive(Parser, Debug)]
#[command(name = "turbows-demo", version, about = "Echo server and one-shot client for TurboWS")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve an echo application at /echo and a room chat at /rooms/{room}
    Serve {
        /// Address to listen on
        #[arg(long, short = 'b', default_value = "127.0.0.1:9001", env = "TURBOWS_BIND")]
        bind: SocketAddr,

        /// Engine configuration file (TOML, YAML or JSON)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Connect, send one text message, print the reply and close
    Send {
        /// Server URI
        #[arg(long, short = 'u', default_value = "ws://127.0.0.1:9001/echo")]
        url: url::Url,

        /// Protocol version to request
        #[arg(long, value_enum, default_value = "rfc6455")]
        version: VersionArg,

        /// Sub-protocols to offer, most preferred first
        #[arg(long = "protocol", short = 'p')]
        subprotocols: Vec<String>,

        /// Message to send
        message: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VersionArg {
    /// RFC 6455 (Sec-WebSocket-Version: 13)
    Rfc6455,
    /// Hybi draft 08 (Sec-WebSocket-Version: 8)
    Hybi08,
}

impl From<VersionArg> for ProtocolVersion {
    fn from(arg: VersionArg) -> Self {
        match arg {
            VersionArg::Rfc6455 => Self::Rfc6455,
            VersionArg::Hybi08 => Self::Hybi08,
        }
    }
}
