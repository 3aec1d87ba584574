//! Common paths for artcache data
//!
//! - `<cache dir>/artcache/<store>/` - disk tier (journal and blobs)
//! - `<config dir>/artcache/config.toml` - configuration

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default store directory name
pub const DEFAULT_STORE_NAME: &str = "artwork";

/// Get the cache root (`~/.cache/artcache` on Linux), creating it.
pub fn cache_root() -> Result<PathBuf> {
    let root = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("artcache");
    fs::create_dir_all(&root).context("Failed to create cache directory")?;
    Ok(root)
}

/// Get the config file path (`~/.config/artcache/config.toml` on Linux)
pub fn config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("artcache").join("config.toml"))
}

/// Directory of one named store under `root`
pub fn store_dir(root: &Path, store_name: &str) -> PathBuf {
    root.join(store_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_dir() {
        let dir = store_dir(Path::new("/tmp/cache"), DEFAULT_STORE_NAME);
        assert_eq!(dir, PathBuf::from("/tmp/cache/artwork"));
    }

    #[test]
    fn test_config_path_file_name() {
        if let Ok(path) = config_path() {
            assert!(path.ends_with("artcache/config.toml"));
        }
    }
}
