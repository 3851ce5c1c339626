// SPDX-License-Identifier: Apache-2.0
//! dagstore server: binds a TCP listener and serves the wire protocol over
//! an in-memory graph/value/tag store, one task per connection.

use anyhow::Result;
use clap::Parser;
use dagstore_config::config::ConfigService;
use dagstore_config::DagstoreConfig;
use dagstore_config_fs::FsConfigStore;
use dagstore_protocol::Server;
use dagstore_storage::{MemoryKeyGraph, MemoryTagStore, MemoryValueStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "dagstore server", long_about = None)]
struct Args {
    /// Address to bind, overriding the persisted config.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config: Option<ConfigService<FsConfigStore>> =
        FsConfigStore::new().map(ConfigService::new).ok();
    let mut settings: DagstoreConfig = config
        .as_ref()
        .and_then(|c| c.load::<DagstoreConfig>("server").ok().flatten())
        .unwrap_or_default();
    if let Some(cfg) = &config {
        let _ = cfg.save("server", &settings);
    }
    if let Some(bind) = args.bind {
        settings.addr = bind;
    }

    let graph = Arc::new(MemoryKeyGraph::new());
    let values = Arc::new(MemoryValueStore::new());
    let tags = Arc::new(MemoryTagStore::new());
    let server = Arc::new(Server::new(
        graph,
        values,
        tags,
        settings.sync_max_pull_vertices,
    ));

    let listener = TcpListener::bind(&settings.addr).await?;
    info!(addr = %settings.addr, "dagstore server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(err) = server.serve_connection(stream).await {
                warn!(%peer, ?err, "connection ended with an error");
            }
        });
    }
}
