// SPDX-License-Identifier: Apache-2.0
//! Filesystem-backed `ConfigStore` for dagstore tools, rooted at the
//! platform config directory (e.g. `~/.config/dagstore` on Linux).
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

use dagstore_config::config::{ConfigError, ConfigStore};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Stores configs as JSON files under the platform config directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Other`] if the platform config directory
    /// cannot be resolved, or [`ConfigError::Io`] if it cannot be created.
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "dagstore", "dagstore")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        let base = proj.config_dir().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let filename = format!("{key}.json");
        self.base.join(filename)
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let path = self.path_for(key);
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_temp_dir() {
        let dir =
            std::env::temp_dir().join(format!("dagstore-config-fs-test-{}", std::process::id()));
        let store = FsConfigStore { base: dir.clone() };
        store.save_raw("example", b"{\"value\":1}").unwrap();
        let back = store.load_raw("example").unwrap();
        assert_eq!(back, b"{\"value\":1}");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = std::env::temp_dir().join(format!(
            "dagstore-config-fs-test-missing-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let store = FsConfigStore { base: dir.clone() };
        assert!(matches!(store.load_raw("nope"), Err(ConfigError::NotFound)));
        let _ = fs::remove_dir_all(dir);
    }
}
