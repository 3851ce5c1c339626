// SPDX-License-Identifier: Apache-2.0
//! Pull/push closure algorithms and watch-delta bookkeeping shared by both
//! ends of a sync session.
//!
//! This crate is the pure-algorithm half of the Sync Engine: it computes
//! subgraphs over a [`KeyGraphStore`]/[`TagStore`] pair and never touches a
//! byte stream. The wire-driving half — dialing a remote, sending requests,
//! writing values — lives in `dagstore-protocol` (server dispatch) and
//! `dagstore-client` (the CLI that drives a pull/push/watch session), both of
//! which call into the functions here rather than re-deriving the closure
//! logic.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

use dagstore_key::Key;
use dagstore_model::{Graph, Tag};
use dagstore_storage::{KeyGraphStore, StoreError, TagStore};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default safety cap on a single pull closure (`sync.max_pull_vertices`).
pub const DEFAULT_MAX_PULL_VERTICES: usize = 1_000_000;

/// Errors the sync engine surfaces.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A closure computation visited more vertices than the configured cap
    /// allows, and was aborted.
    #[error("pull closure exceeded the configured vertex cap of {cap}")]
    TooManyVertices {
        /// The cap that was exceeded.
        cap: usize,
    },
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve `sinks` through the tag store, then compute the pull closure of
/// the resulting keys.
///
/// # Errors
///
/// Returns [`SyncError::Store`] if a store operation fails, or
/// [`SyncError::TooManyVertices`] if the closure exceeds `max_vertices`.
pub async fn pull_closure<G, T>(
    graph: &G,
    tags: &T,
    roots: Vec<Key>,
    sinks: Vec<Tag>,
    max_vertices: usize,
) -> Result<Graph, SyncError>
where
    G: KeyGraphStore,
    T: TagStore,
{
    let mut sink_keys = Vec::with_capacity(sinks.len());
    for tag in &sinks {
        if let Some(k) = tags.read(tag).await? {
            sink_keys.push(k);
        }
    }
    pull_closure_from_keys(graph, roots, sink_keys, max_vertices).await
}

/// Reverse-BFS the predecessor edges of `graph` starting from `sinks`,
/// stopping descent at any key in `roots`.
///
/// Returns the collected vertex set and the induced edge set (every edge of
/// `graph` whose both endpoints landed in the vertex set). If `roots` is
/// empty, the full transitive closure up to `sinks` is returned.
///
/// # Errors
///
/// Returns [`SyncError::Store`] if a store operation fails, or
/// [`SyncError::TooManyVertices`] if more than `max_vertices` vertices would
/// be collected — a safety cap against an adversarial or mistaken pull
/// request.
pub async fn pull_closure_from_keys<G>(
    graph: &G,
    roots: Vec<Key>,
    sinks: Vec<Key>,
    max_vertices: usize,
) -> Result<Graph, SyncError>
where
    G: KeyGraphStore,
{
    let cut: HashSet<Key> = roots.into_iter().collect();
    let mut visited: HashSet<Key> = HashSet::new();
    let mut queue: VecDeque<Key> = VecDeque::new();

    for sink in sinks {
        if !cut.contains(&sink) && visited.insert(sink) {
            queue.push_back(sink);
        }
    }

    while let Some(k) = queue.pop_front() {
        if visited.len() > max_vertices {
            return Err(SyncError::TooManyVertices { cap: max_vertices });
        }
        for p in graph.pred(k).await? {
            if !cut.contains(&p) && visited.insert(p) {
                queue.push_back(p);
            }
        }
    }

    let mut edges = Vec::new();
    for &k in &visited {
        for p in graph.pred(k).await? {
            if visited.contains(&p) {
                edges.push((p, k));
            }
        }
    }

    Ok(Graph {
        vertices: visited.into_iter().collect(),
        edges,
    })
}

/// The minimal subgraph a client should push: the same reverse-BFS closure
/// as a pull, computed against the client's own local graph store.
///
/// The protocol does not dedupe on the client's behalf — this function *is*
/// the client's minimization step, called before `SYNC_PUSH_KEYS`.
///
/// # Errors
///
/// Returns [`SyncError`] under the same conditions as [`pull_closure_from_keys`].
pub async fn push_subgraph<G>(
    graph: &G,
    roots: Vec<Key>,
    sinks: Vec<Key>,
    max_vertices: usize,
) -> Result<Graph, SyncError>
where
    G: KeyGraphStore,
{
    pull_closure_from_keys(graph, roots, sinks, max_vertices).await
}

/// Tracks the last-observed key for a set of watched tags, so repeated calls
/// to [`Watcher::diff`] report only what changed since the previous call.
#[derive(Default)]
pub struct Watcher {
    last: HashMap<Tag, Option<Key>>,
}

impl Watcher {
    /// A watcher with no prior observations — the first `diff` call reports
    /// every currently-bound subscribed tag as new.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the current value of every tag in `subscribed` against the
    /// last-observed value, returning the tags that changed and the union of
    /// their delta graphs (vertices reachable from the new value but not the
    /// old one).
    ///
    /// Returns `None` if nothing changed since the last call.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if a store operation fails or a single tag's
    /// delta closure exceeds `max_vertices`.
    pub async fn diff<G, T>(
        &mut self,
        graph: &G,
        tags: &T,
        subscribed: &[Tag],
        max_vertices: usize,
    ) -> Result<Option<(Vec<Tag>, Graph)>, SyncError>
    where
        G: KeyGraphStore,
        T: TagStore,
    {
        let mut changed = Vec::new();
        let mut vertices: HashSet<Key> = HashSet::new();
        let mut edges: HashSet<(Key, Key)> = HashSet::new();

        for tag in subscribed {
            let current = tags.read(tag).await?;
            let previous = self.last.get(tag).copied().flatten();
            if current == previous {
                continue;
            }
            changed.push(tag.clone());
            self.last.insert(tag.clone(), current);

            if let Some(new_key) = current {
                let roots = previous.into_iter().collect();
                let delta =
                    pull_closure_from_keys(graph, roots, vec![new_key], max_vertices).await?;
                vertices.extend(delta.vertices);
                edges.extend(delta.edges);
            }
        }

        if changed.is_empty() {
            return Ok(None);
        }

        Ok(Some((
            changed,
            Graph {
                vertices: vertices.into_iter().collect(),
                edges: edges.into_iter().collect(),
            },
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dagstore_storage::{MemoryKeyGraph, MemoryTagStore};

    async fn chain(graph: &MemoryKeyGraph, n: usize) -> Vec<Key> {
        let keys: Vec<Key> = (0..n)
            .map(|i| Key::of_bytes(format!("k{i}").as_bytes()))
            .collect();
        for window in keys.windows(2) {
            graph.add_relation(window[0], window[1]).await.unwrap();
        }
        keys
    }

    #[tokio::test]
    async fn pull_from_empty_client_returns_full_chain() {
        let graph = MemoryKeyGraph::new();
        let tags = MemoryTagStore::new();
        let keys = chain(&graph, 3).await;
        tags.update(Tag::new("head"), keys[2]).await.unwrap();

        let result = pull_closure(&graph, &tags, vec![], vec![Tag::new("head")], 1_000)
            .await
            .unwrap();

        let mut vertices = result.vertices.clone();
        vertices.sort();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(vertices, expected);
        assert_eq!(result.edges.len(), 2);
    }

    #[tokio::test]
    async fn pull_with_root_cutoff_excludes_ancestor() {
        let graph = MemoryKeyGraph::new();
        let tags = MemoryTagStore::new();
        let keys = chain(&graph, 3).await;
        tags.update(Tag::new("head"), keys[2]).await.unwrap();

        let result = pull_closure(&graph, &tags, vec![keys[0]], vec![Tag::new("head")], 1_000)
            .await
            .unwrap();

        let mut vertices = result.vertices.clone();
        vertices.sort();
        assert_eq!(vertices, vec![keys[1], keys[2]]);
        assert_eq!(result.edges, vec![(keys[1], keys[2])]);
    }

    #[tokio::test]
    async fn pull_closure_respects_vertex_cap() {
        let graph = MemoryKeyGraph::new();
        let keys = chain(&graph, 5).await;
        let err = pull_closure_from_keys(&graph, vec![], vec![keys[4]], 2)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TooManyVertices { cap: 2 }));
    }

    #[tokio::test]
    async fn watcher_reports_nothing_on_unchanged_tags() {
        let graph = MemoryKeyGraph::new();
        let tags = MemoryTagStore::new();
        let keys = chain(&graph, 1).await;
        tags.update(Tag::new("main"), keys[0]).await.unwrap();

        let mut watcher = Watcher::new();
        let first = watcher
            .diff(&graph, &tags, &[Tag::new("main")], 1_000)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = watcher
            .diff(&graph, &tags, &[Tag::new("main")], 1_000)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn watcher_reports_delta_on_tag_advance() {
        let graph = MemoryKeyGraph::new();
        let tags = MemoryTagStore::new();
        let keys = chain(&graph, 3).await;
        tags.update(Tag::new("main"), keys[0]).await.unwrap();

        let mut watcher = Watcher::new();
        watcher
            .diff(&graph, &tags, &[Tag::new("main")], 1_000)
            .await
            .unwrap();

        tags.update(Tag::new("main"), keys[2]).await.unwrap();
        let (changed, delta) = watcher
            .diff(&graph, &tags, &[Tag::new("main")], 1_000)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(changed, vec![Tag::new("main")]);
        let mut vertices = delta.vertices;
        vertices.sort();
        assert_eq!(vertices, vec![keys[1], keys[2]]);
    }
}
