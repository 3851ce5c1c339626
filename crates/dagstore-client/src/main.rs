// SPDX-License-Identifier: Apache-2.0
//! `dagstore-client`: a `pull`/`push`/`tag`/`watch` CLI driving a remote
//! dagstore server over TCP.

// The CLI is expected to print its output to stdout.
#![allow(clippy::print_stdout)]

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dagstore_client::RemoteClient;
use dagstore_codec::to_json;
use dagstore_key::Key;
use dagstore_model::{Graph, Tag};
use dagstore_storage::{KeyGraphStore, MemoryKeyGraph};
use dagstore_sync::DEFAULT_MAX_PULL_VERTICES;

#[derive(Parser, Debug)]
#[command(author, version, about = "dagstore client", long_about = None)]
struct Args {
    /// Server address to connect to.
    #[arg(short, long, default_value = "127.0.0.1:4460")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull the closure of one or more tags, cut at a set of root keys.
    Pull {
        /// Hex-encoded keys the receiver already has; descent stops there.
        #[arg(long, value_delimiter = ',')]
        roots: Vec<String>,
        /// Tag names whose bound keys seed the closure.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Push the minimal closure of `sinks` cut at `roots`, read from a local
    /// JSON graph dump, then bind `tags` to their new keys on the server.
    Push {
        /// Path to a JSON-encoded `Graph` describing everything locally
        /// known; the client computes the minimal subgraph to send from it.
        #[arg(long)]
        graph_file: String,
        /// Hex-encoded keys the server already has.
        #[arg(long, value_delimiter = ',')]
        roots: Vec<String>,
        /// Hex-encoded keys to push.
        #[arg(long, value_delimiter = ',')]
        sinks: Vec<String>,
        /// `name=hexkey` tag bindings to advance after the push.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Tag operations.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Subscribe to a set of tags and print each delta event as JSON.
    Watch {
        /// Tag names to subscribe to.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TagAction {
    /// Read a tag's bound key.
    Get {
        /// Tag name.
        name: String,
    },
    /// Bind a tag to a key.
    Set {
        /// Tag name.
        name: String,
        /// Hex-encoded key.
        key: String,
    },
    /// Remove a tag.
    Remove {
        /// Tag name.
        name: String,
    },
    /// List all known tags.
    List,
}

fn parse_keys(hex_keys: &[String]) -> Result<Vec<Key>> {
    hex_keys
        .iter()
        .map(|s| Key::from_hex(s).map_err(|e| anyhow!("invalid key {s:?}: {e}")))
        .collect()
}

fn parse_tag_bindings(entries: &[String]) -> Result<Vec<(Tag, Key)>> {
    entries
        .iter()
        .map(|entry| {
            let (name, key_hex) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("expected name=hexkey, got {entry:?}"))?;
            let key = Key::from_hex(key_hex).map_err(|e| anyhow!("invalid key {key_hex:?}: {e}"))?;
            Ok((Tag::new(name), key))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.command {
        Command::Pull { roots, tags } => {
            let roots = parse_keys(&roots)?;
            let tags = tags.into_iter().map(Tag::new).collect();
            let mut client = RemoteClient::connect(&args.server).await?;
            let graph = client.sync_pull_keys(roots, tags).await?;
            println!("{}", to_json(&graph)?);
        }
        Command::Push {
            graph_file,
            roots,
            sinks,
            tags,
        } => {
            let raw = std::fs::read_to_string(&graph_file)
                .with_context(|| format!("reading {graph_file}"))?;
            let local: Graph = serde_json::from_str(&raw)?;
            let local_store = MemoryKeyGraph::new();
            for k in &local.vertices {
                local_store.add_key(*k).await?;
            }
            for (pred, succ) in &local.edges {
                local_store.add_relation(*pred, *succ).await?;
            }
            let roots = parse_keys(&roots)?;
            let sinks = parse_keys(&sinks)?;
            let minimal = dagstore_sync::push_subgraph(
                &local_store,
                roots,
                sinks,
                DEFAULT_MAX_PULL_VERTICES,
            )
            .await?;
            let bindings = parse_tag_bindings(&tags)?;
            let mut client = RemoteClient::connect(&args.server).await?;
            client.sync_push_keys(minimal, bindings).await?;
            println!("pushed");
        }
        Command::Tag { action } => {
            let mut client = RemoteClient::connect(&args.server).await?;
            match action {
                TagAction::Get { name } => {
                    let bound = client.tag_read(Tag::new(name)).await?;
                    match bound {
                        Some(k) => println!("{}", k.to_hex()),
                        None => println!("(unbound)"),
                    }
                }
                TagAction::Set { name, key } => {
                    let key = Key::from_hex(&key).map_err(|e| anyhow!("invalid key: {e}"))?;
                    client.tag_update(Tag::new(name), key).await?;
                    println!("ok");
                }
                TagAction::Remove { name } => {
                    client.tag_remove(Tag::new(name)).await?;
                    println!("ok");
                }
                TagAction::List => {
                    for tag in client.tag_list().await? {
                        println!("{tag}");
                    }
                }
            }
        }
        Command::Watch { tags } => {
            let client = RemoteClient::connect(&args.server).await?;
            let mut stream = client.watch(tags.into_iter().map(Tag::new).collect()).await?;
            loop {
                let (changed, delta) = stream.next().await?;
                println!(
                    "{}",
                    serde_json::json!({ "changed": changed, "delta": to_json(&delta)? })
                );
            }
        }
    }

    Ok(())
}
