// SPDX-License-Identifier: Apache-2.0
//! In-memory reference backends for the three store traits.

use crate::{KeyGraphStore, StoreError, TagStore, ValueStore};
use dagstore_key::Key;
use dagstore_model::{Tag, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory [`KeyGraphStore`]: a `HashMap`-backed adjacency list guarded by
/// a single `RwLock`.
#[derive(Default)]
pub struct MemoryKeyGraph {
    inner: RwLock<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    vertices: Vec<Key>,
    pred: HashMap<Key, Vec<Key>>,
    succ: HashMap<Key, Vec<Key>>,
}

impl GraphInner {
    fn insert_vertex(&mut self, k: Key) {
        if !self.vertices.contains(&k) {
            self.vertices.push(k);
        }
    }
}

impl MemoryKeyGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyGraphStore for MemoryKeyGraph {
    async fn add_key(&self, k: Key) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        g.insert_vertex(k);
        Ok(())
    }

    async fn add_relation(&self, pred: Key, succ: Key) -> Result<(), StoreError> {
        let mut g = self.inner.write().await;
        g.insert_vertex(pred);
        g.insert_vertex(succ);
        let succs = g.succ.entry(pred).or_default();
        if !succs.contains(&succ) {
            succs.push(succ);
        }
        let preds = g.pred.entry(succ).or_default();
        if !preds.contains(&pred) {
            preds.push(pred);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Key>, StoreError> {
        Ok(self.inner.read().await.vertices.clone())
    }

    async fn pred(&self, k: Key) -> Result<Vec<Key>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .pred
            .get(&k)
            .cloned()
            .unwrap_or_default())
    }

    async fn succ(&self, k: Key) -> Result<Vec<Key>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .succ
            .get(&k)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory [`ValueStore`]: content-addressed, append-only.
#[derive(Default)]
pub struct MemoryValueStore {
    inner: RwLock<HashMap<Key, Value>>,
}

impl MemoryValueStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueStore for MemoryValueStore {
    async fn write(&self, v: Value) -> Result<Key, StoreError> {
        let k = v.key();
        let mut map = self.inner.write().await;
        map.entry(k).or_insert(v);
        Ok(k)
    }

    async fn read(&self, k: Key) -> Result<Option<Value>, StoreError> {
        let map = self.inner.read().await;
        match map.get(&k) {
            None => Ok(None),
            Some(v) if v.key() == k => Ok(Some(v.clone())),
            Some(v) => Err(StoreError::Integrity {
                expected: k,
                computed: v.key(),
            }),
        }
    }
}

/// In-memory [`TagStore`]: last-writer-wins, single-lock-serialized.
#[derive(Default)]
pub struct MemoryTagStore {
    inner: RwLock<HashMap<Tag, Key>>,
}

impl MemoryTagStore {
    /// An empty tag namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TagStore for MemoryTagStore {
    async fn update(&self, t: Tag, k: Key) -> Result<(), StoreError> {
        self.inner.write().await.insert(t, k);
        Ok(())
    }

    async fn remove(&self, t: &Tag) -> Result<(), StoreError> {
        self.inner.write().await.remove(t);
        Ok(())
    }

    async fn read(&self, t: &Tag) -> Result<Option<Key>, StoreError> {
        Ok(self.inner.read().await.get(t).copied())
    }

    async fn list(&self) -> Result<Vec<Tag>, StoreError> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dagstore_model::Payload;

    #[tokio::test]
    async fn value_store_write_is_idempotent_and_content_addressed() {
        let store = MemoryValueStore::new();
        let v1 = Value::blob(*b"hello");
        let v2 = Value::blob(*b"hello");
        let k1 = store.write(v1.clone()).await.unwrap();
        let k2 = store.write(v2).await.unwrap();
        assert_eq!(k1, k2);
        assert_eq!(store.read(k1).await.unwrap(), Some(v1));
    }

    #[tokio::test]
    async fn value_store_read_missing_is_none() {
        let store = MemoryValueStore::new();
        let k = Value::blob(*b"never written").key();
        assert_eq!(store.read(k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn key_graph_add_relation_is_idempotent_and_inverse() {
        let graph = MemoryKeyGraph::new();
        let a = Key::of_bytes(b"a");
        let b = Key::of_bytes(b"b");
        graph.add_relation(a, b).await.unwrap();
        graph.add_relation(a, b).await.unwrap();
        assert_eq!(graph.succ(a).await.unwrap(), vec![b]);
        assert_eq!(graph.pred(b).await.unwrap(), vec![a]);
        assert_eq!(graph.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn key_graph_unknown_vertex_has_empty_incidence() {
        let graph = MemoryKeyGraph::new();
        let k = Key::of_bytes(b"unknown");
        assert!(graph.pred(k).await.unwrap().is_empty());
        assert!(graph.succ(k).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tag_store_update_read_remove_lifecycle() {
        let store = MemoryTagStore::new();
        let tag = Tag::new("main");
        let k = Value::blob(*b"root").key();
        store.update(tag.clone(), k).await.unwrap();
        assert_eq!(store.read(&tag).await.unwrap(), Some(k));
        assert!(store.list().await.unwrap().contains(&tag));
        store.remove(&tag).await.unwrap();
        assert_eq!(store.read(&tag).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tag_store_remove_missing_is_noop() {
        let store = MemoryTagStore::new();
        let tag = Tag::new("ghost");
        store.remove(&tag).await.unwrap();
        assert_eq!(store.read(&tag).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tag_store_update_allows_dangling_tags() {
        let store = MemoryTagStore::new();
        let tag = Tag::new("dangling");
        let k = Value::node(vec![("x".into(), Key::of_bytes(b"x"))]).key();
        store.update(tag.clone(), k).await.unwrap();
        assert_eq!(store.read(&tag).await.unwrap(), Some(k));
    }

    #[tokio::test]
    async fn node_with_two_children_end_to_end_scenario() {
        let values = MemoryValueStore::new();
        let graph = MemoryKeyGraph::new();

        let k_a = values.write(Value::blob(*b"a")).await.unwrap();
        let k_b = values.write(Value::blob(*b"b")).await.unwrap();
        let node = Value::node(vec![("l1".into(), k_a), ("l2".into(), k_b)]);
        let k_n = values.write(node.clone()).await.unwrap();
        for &child in node.pred() {
            graph.add_relation(child, k_n).await.unwrap();
        }

        assert_eq!(node.pred(), &[k_a.min(k_b), k_a.max(k_b)]);
        assert_eq!(graph.succ(k_a).await.unwrap(), vec![k_n]);
        assert_eq!(graph.succ(k_b).await.unwrap(), vec![k_n]);

        match values.read(k_n).await.unwrap().unwrap().payload() {
            Payload::Node(children) => assert_eq!(children.len(), 2),
            Payload::Blob(_) => panic!("expected node payload"),
        }
    }
}
