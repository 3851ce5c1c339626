// SPDX-License-Identifier: Apache-2.0
//! Immutable `Value`s, mutable `Tag` names, and the three-way merge algebra
//! that reconciles diverging `Value`s in the content-addressed DAG.
//!
//! A [`Value`] carries an opaque [`Payload`] (blob bytes, or an ordered list
//! of named child keys) plus an explicit predecessor list. Its [`Value::key`]
//! is a pure function of both — two stores holding the same set of `Value`s
//! hold the same set of keys.
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
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A human-chosen UTF-8 name bound to a [`Key`] in the tag namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    /// Wrap a name as a tag. No structural constraints beyond UTF-8, which
    /// `String` already guarantees.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// View the tag's name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The opaque payload a [`Value`] carries — a blob leaf, or a node of named
/// child keys.
///
/// Node children are kept sorted by label at construction so the canonical
/// encoding (and therefore the derived key) does not depend on the order
/// callers supplied them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque leaf bytes.
    Blob(Vec<u8>),
    /// An ordered list of `(label, key)` pairs, sorted by label.
    Node(Vec<(String, Key)>),
}

impl Payload {
    /// Build a node payload, sorting children by label.
    #[must_use]
    pub fn node(mut children: Vec<(String, Key)>) -> Self {
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Self::Node(children)
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Payload::Blob(bytes) => {
                out.push(0u8);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            Payload::Node(children) => {
                out.push(1u8);
                out.extend_from_slice(&(children.len() as u32).to_be_bytes());
                for (label, key) in children {
                    let label_bytes = label.as_bytes();
                    out.extend_from_slice(&(label_bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(label_bytes);
                    out.extend_from_slice(key.as_bytes());
                }
            }
        }
        out
    }
}

/// A vertex/edge subgraph of keys, as returned by pull and carried by push.
///
/// Serializes as `{ "vertices": [...], "edges": [[a, b], ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// All vertices in the subgraph, unspecified order.
    pub vertices: Vec<Key>,
    /// All edges `(pred, succ)` whose endpoints are both in `vertices`.
    pub edges: Vec<(Key, Key)>,
}

impl Graph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// An immutable payload with a predecessor list; its [`Value::key`] is the
/// hash of its canonical encoding.
///
/// The predecessor list is kept sorted at construction (including by
/// [`Value::merge`]), which is what makes merge commutative at the key
/// level: the two orderings of a pair of predecessors hash to the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    payload: Payload,
    pred: Vec<Key>,
    #[serde(skip)]
    key: OnceLock<Key>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.pred == other.pred
    }
}
impl Eq for Value {}

impl Value {
    /// Construct a value from a payload and its (unordered) predecessor keys.
    /// The predecessor list is sorted before storage.
    #[must_use]
    pub fn new(payload: Payload, mut pred: Vec<Key>) -> Self {
        pred.sort();
        Self {
            payload,
            pred,
            key: OnceLock::new(),
        }
    }

    /// Construct a blob leaf value with no predecessors.
    #[must_use]
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Payload::Blob(bytes.into()), Vec::new())
    }

    /// Construct a node value from named child keys; `pred` is taken to be
    /// the child keys themselves — a node's predecessors are its children.
    #[must_use]
    pub fn node(children: Vec<(String, Key)>) -> Self {
        let pred = children.iter().map(|(_, k)| *k).collect();
        Self::new(Payload::node(children), pred)
    }

    /// The payload this value carries.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The (sorted) predecessor keys declared at construction.
    #[must_use]
    pub fn pred(&self) -> &[Key] {
        &self.pred
    }

    /// The canonical byte encoding this value's key is derived from: a
    /// 1-byte discriminant is implicit in [`Payload::canonical_bytes`], the
    /// payload bytes, then the sorted predecessor list.
    ///
    /// Exposed so the wire codec can write exactly these bytes rather than
    /// re-deriving them, keeping `key(v) = hash(canonical_encoding(v))` true
    /// by construction rather than by convention.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = self.payload.canonical_bytes();
        out.extend_from_slice(&(self.pred.len() as u32).to_be_bytes());
        for k in &self.pred {
            out.extend_from_slice(k.as_bytes());
        }
        out
    }

    /// The derived key, cached after first computation.
    #[must_use]
    pub fn key(&self) -> Key {
        *self.key.get_or_init(|| Key::of_bytes(&self.canonical_bytes()))
    }

    /// Three-way-style merge of `a` and `b`, using `resolve` to reconcile
    /// diverging child keys inside node payloads.
    ///
    /// Identical values merge trivially; two blobs merge only if byte-equal;
    /// two nodes merge label-wise, taking the unique key where only one side
    /// has a label and calling `resolve` where both sides disagree. Returns
    /// `None` on an unresolvable blob conflict, a blob/node type mismatch,
    /// or when `resolve` itself returns `None` for some diverging child pair.
    pub fn merge<F>(resolve: &mut F, a: &Value, b: &Value) -> Option<Value>
    where
        F: FnMut(Key, Key) -> Option<Key>,
    {
        if a == b {
            return Some(a.clone());
        }
        match (&a.payload, &b.payload) {
            (Payload::Blob(ba), Payload::Blob(bb)) => {
                if ba == bb {
                    Some(a.clone())
                } else {
                    None
                }
            }
            (Payload::Node(na), Payload::Node(nb)) => {
                merge_nodes(resolve, na, nb).map(|children| {
                    Value::new(Payload::Node(children), vec![a.key(), b.key()])
                })
            }
            _ => None,
        }
    }
}

fn merge_nodes<F>(
    resolve: &mut F,
    a: &[(String, Key)],
    b: &[(String, Key)],
) -> Option<Vec<(String, Key)>>
where
    F: FnMut(Key, Key) -> Option<Key>,
{
    let mut by_label: std::collections::BTreeMap<&str, (Option<Key>, Option<Key>)> =
        std::collections::BTreeMap::new();
    for (label, key) in a {
        by_label.entry(label.as_str()).or_default().0 = Some(*key);
    }
    for (label, key) in b {
        by_label.entry(label.as_str()).or_default().1 = Some(*key);
    }

    let mut out = Vec::with_capacity(by_label.len());
    for (label, (ka, kb)) in by_label {
        let resolved = match (ka, kb) {
            (Some(x), Some(y)) if x == y => x,
            (Some(x), Some(y)) => resolve(x, y)?,
            (Some(x), None) | (None, Some(x)) => x,
            (None, None) => continue,
        };
        out.push((label.to_string(), resolved));
    }
    Some(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn always_resolve(_a: Key, _b: Key) -> Option<Key> {
        None
    }

    #[test]
    fn blob_value_has_no_predecessors() {
        let v = Value::blob(*b"hello");
        assert!(v.pred().is_empty());
    }

    #[test]
    fn node_value_predecessors_are_sorted_children() {
        let k_a = Value::blob(*b"a").key();
        let k_b = Value::blob(*b"b").key();
        let n = Value::node(vec![("l2".into(), k_b), ("l1".into(), k_a)]);
        let mut expected = vec![k_a, k_b];
        expected.sort();
        assert_eq!(n.pred(), expected.as_slice());
    }

    #[test]
    fn key_is_pure_function_of_payload_and_pred() {
        let a = Value::blob(*b"same");
        let b = Value::blob(*b"same");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn merge_reflexivity() {
        let v = Value::node(vec![("l".into(), Value::blob(*b"x").key())]);
        let mut resolve = always_resolve;
        let merged = Value::merge(&mut resolve, &v, &v).unwrap();
        assert_eq!(merged.key(), v.key());
    }

    #[test]
    fn merge_blob_conflict_is_none() {
        let a = Value::blob(*b"x");
        let b = Value::blob(*b"y");
        let mut resolve = always_resolve;
        assert!(Value::merge(&mut resolve, &a, &b).is_none());
    }

    #[test]
    fn merge_blob_equal_bytes_resolves() {
        let a = Value::new(Payload::Blob(b"x".to_vec()), vec![Value::blob(*b"p1").key()]);
        let b = Value::new(Payload::Blob(b"x".to_vec()), vec![Value::blob(*b"p2").key()]);
        let mut resolve = always_resolve;
        let merged = Value::merge(&mut resolve, &a, &b).unwrap();
        assert_eq!(merged.key(), a.key());
    }

    #[test]
    fn merge_mixed_blob_node_is_none() {
        let blob = Value::blob(*b"x");
        let node = Value::node(vec![]);
        let mut resolve = always_resolve;
        assert!(Value::merge(&mut resolve, &blob, &node).is_none());
    }

    #[test]
    fn merge_nodes_union_of_disjoint_labels() {
        let k_a = Value::blob(*b"a").key();
        let k_b = Value::blob(*b"b").key();
        let n1 = Value::node(vec![("l".into(), k_a)]);
        let n2 = Value::node(vec![("l".into(), k_a), ("m".into(), k_b)]);
        let mut resolve = |_: Key, x: Key| Some(x);
        let merged = Value::merge(&mut resolve, &n1, &n2).unwrap();
        let Payload::Node(children) = merged.payload() else {
            panic!("expected node payload");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(merged.pred(), [n1.key(), n2.key()].as_slice());
    }

    #[test]
    fn merge_divergent_child_invokes_resolver_and_none_aborts() {
        let k_a = Value::blob(*b"a").key();
        let k_b = Value::blob(*b"b").key();
        let n1 = Value::node(vec![("l".into(), k_a)]);
        let n2 = Value::node(vec![("l".into(), k_b)]);
        let mut never_resolve = |_: Key, _: Key| None;
        assert!(Value::merge(&mut never_resolve, &n1, &n2).is_none());

        let mut always_second = |_: Key, y: Key| Some(y);
        let merged = Value::merge(&mut always_second, &n1, &n2).unwrap();
        let Payload::Node(children) = merged.payload() else {
            panic!("expected node payload");
        };
        assert_eq!(children[0].1, k_b);
    }

    #[test]
    fn merge_predecessor_commutativity_on_node_merge() {
        let k_a = Value::blob(*b"a").key();
        let k_b = Value::blob(*b"b").key();
        let n1 = Value::node(vec![("l".into(), k_a)]);
        let n2 = Value::node(vec![("l".into(), k_a), ("m".into(), k_b)]);
        let mut resolve_ab = |_: Key, y: Key| Some(y);
        let mut resolve_ba = |x: Key, _: Key| Some(x);
        let forward = Value::merge(&mut resolve_ab, &n1, &n2).unwrap();
        let backward = Value::merge(&mut resolve_ba, &n2, &n1).unwrap();
        assert_eq!(forward.key(), backward.key());
    }

    #[test]
    fn json_round_trip_for_blob_value() {
        let v = Value::blob(*b"json me");
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key(), v.key());
    }

    #[test]
    fn tag_display_and_as_str() {
        let t = Tag::new("main");
        assert_eq!(t.as_str(), "main");
        assert_eq!(format!("{t}"), "main");
    }
}
