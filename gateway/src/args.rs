use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command-line arguments for the gateway binary.
#[derive(Debug, Parser)]
#[command(name = "nexus", version, about = "LLM gateway")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "NEXUS_CONFIG", default_value = "nexus.toml")]
    pub config: PathBuf,

    /// Overrides the `server.listen_address` configured in the config file.
    #[arg(short, long, env = "NEXUS_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// `env_logger`-style log filter, e.g. `info` or `llm=debug,server=info`.
    #[arg(long, env = "NEXUS_LOG", default_value = "info")]
    pub log: String,

    /// Disables authentication, treating every request as the synthetic admin principal.
    #[arg(long, env = "NEXUS_AUTH_DISABLED")]
    pub auth_disabled: bool,
}
