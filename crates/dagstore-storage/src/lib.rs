// SPDX-License-Identifier: Apache-2.0
//! Store traits and in-memory reference backends for dagstore's three-store
//! data model: the Key-Graph Store, the Value Store, and the Tag Store.
//!
//! Each trait is parameterized by nothing but `Key`/`Value`/`Tag` from
//! [`dagstore_key`]/[`dagstore_model`] — alternate backends (disk, remote)
//! implement the same traits without the rest of the crate caring which one
//! is wired in. The in-memory reference ([`MemoryKeyGraph`],
//! [`MemoryValueStore`], [`MemoryTagStore`]) guards its state behind a single
//! `tokio::sync::RwLock`, matching the "single lock per store" note in the
//! concurrency model: readers proceed concurrently with each other, and with
//! writers only serialized amongst themselves.
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

mod memory;

pub use memory::{MemoryKeyGraph, MemoryTagStore, MemoryValueStore};

use dagstore_key::Key;
use dagstore_model::{Tag, Value};
use std::future::Future;

/// Errors a store backend may surface.
///
/// `NotFound` is deliberately absent: per the data model, absence is an
/// `Option::None`, not an error. Only integrity violations and underlying
/// I/O failures are errors here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored `Value`'s derived key did not match the key it was stored
    /// under — storage corruption.
    #[error("integrity violation: expected key {expected}, stored value hashes to {computed}")]
    Integrity {
        /// The key the value was read under.
        expected: Key,
        /// The key the value's bytes actually hash to.
        computed: Key,
    },
    /// Underlying I/O failure (relevant to non-memory backends).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only DAG of keys: vertex insertion, edge insertion, and the
/// `pred`/`succ` incidence queries the Sync Engine walks.
///
/// No vertex or edge is ever removed. The graph may be a strict superset of
/// the Value Store's DAG — keys can be tracked (e.g. during a bulk pull)
/// before their values arrive.
pub trait KeyGraphStore: Send + Sync {
    /// Idempotent vertex insertion.
    fn add_key(&self, k: Key) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Idempotent edge insertion; inserts both endpoints as vertices if
    /// absent.
    fn add_relation(
        &self,
        pred: Key,
        succ: Key,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All vertices, in unspecified order.
    fn list(&self) -> impl Future<Output = Result<Vec<Key>, StoreError>> + Send;

    /// Predecessors of `k` — `[]` if `k` is unknown.
    fn pred(&self, k: Key) -> impl Future<Output = Result<Vec<Key>, StoreError>> + Send;

    /// Successors of `k` — `[]` if `k` is unknown.
    fn succ(&self, k: Key) -> impl Future<Output = Result<Vec<Key>, StoreError>> + Send;
}

/// Content-addressed immutable key-to-value mapping.
///
/// Write-returns-key, read-by-key, no delete. Concurrent writers supplying
/// the same `Value` observe the same `Key` without corrupting state —
/// guaranteed by content addressing, not by locking discipline.
pub trait ValueStore: Send + Sync {
    /// Compute `k = key(v)`; insert `(k, v)` if absent. Idempotent, returns
    /// `k` either way.
    fn write(&self, v: Value) -> impl Future<Output = Result<Key, StoreError>> + Send;

    /// `Some(v)` iff `k` is present.
    fn read(&self, k: Key) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;
}

/// Mutable name-to-key mapping. Writes to a single tag are serialized by the
/// store; across tags, no ordering is guaranteed.
pub trait TagStore: Send + Sync {
    /// Upsert `t -> k`.
    fn update(&self, t: Tag, k: Key) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete `t` if present; no-op otherwise.
    fn remove(&self, t: &Tag) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `Some(k)` iff `t` is bound, `None` otherwise (including unknown tags).
    fn read(&self, t: &Tag) -> impl Future<Output = Result<Option<Key>, StoreError>> + Send;

    /// All known tag names, in unspecified order.
    fn list(&self) -> impl Future<Output = Result<Vec<Tag>, StoreError>> + Send;
}
