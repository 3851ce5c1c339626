// SPDX-License-Identifier: Apache-2.0
//! Configuration port and the server/client knobs for dagstore.
//!
//! [`config`] carries the storage-agnostic `ConfigStore` port and the
//! `ConfigService` that (de)serializes typed values through it — unchanged
//! in shape from the app-core config service this crate is derived from.
//! [`DagstoreConfig`] is the one concrete value both binaries load: the
//! three knobs named in the wire protocol plus the address they bind or
//! connect to.
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

pub mod config;

use serde::{Deserialize, Serialize};

/// The default bind/connect address for both binaries.
pub const DEFAULT_ADDR: &str = "127.0.0.1:4460";

/// The knobs named in the wire protocol (`hash.width`, `codec.initial_window`,
/// `sync.max_pull_vertices`) plus the address the server binds and the
/// client connects to. Loaded once at startup and persisted on first run,
/// the same way the service this crate is derived from loads its host
/// preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagstoreConfig {
    /// The address a server binds, or a client connects to.
    pub addr: String,
    /// The content-address digest width in bytes (32 for BLAKE3).
    pub hash_width: usize,
    /// Initial capacity, in bytes, the codec's read window pre-allocates.
    pub codec_initial_window: usize,
    /// Safety cap on the number of vertices a single pull/push closure may
    /// visit before it is aborted as `SYNC_PULL_KEYS`'s `ERR` reply.
    pub sync_max_pull_vertices: usize,
}

impl Default for DagstoreConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            hash_width: 32,
            codec_initial_window: 64 * 1024,
            sync_max_pull_vertices: 1_000_000,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = DagstoreConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: DagstoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
