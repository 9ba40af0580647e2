use std::{net::SocketAddr, sync::Arc};

use args::Args;
use clap::Parser;
use server::{AlwaysAdmin, ServeConfig};
use tokio_util::sync::CancellationToken;

mod args;

const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load(&args.config)?;

    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.parse::<SocketAddr>().expect("valid default address"));

    let shutdown_signal = CancellationToken::new();
    let ctrl_c_signal = shutdown_signal.clone();

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {err}");
        }
        ctrl_c_signal.cancel();
    });

    server::serve(ServeConfig {
        listen_address,
        config,
        principal_lookup: Arc::new(AlwaysAdmin),
        auth_disabled: args.auth_disabled,
        shutdown_signal,
        log_filter: args.log,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}
