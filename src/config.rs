//! Configuration module for artcache

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::KeyCodec;
use crate::disk::{DISK_FORMAT_VERSION, DiskOptions};
use crate::fetch::{DecodeOptions, HttpOptions, decode};
use crate::models::{EncodeFormat, EncodeOptions};
use crate::paths;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Keep decoded images in memory
    #[serde(default = "default_true")]
    pub memory_cache_enabled: bool,

    /// Memory tier budget in decoded bytes
    #[serde(default = "default_memory_budget")]
    pub memory_budget_bytes: usize,

    /// Keep encoded images on disk
    #[serde(default = "default_true")]
    pub disk_cache_enabled: bool,

    /// Disk tier budget in bytes
    #[serde(default = "default_disk_budget")]
    pub disk_budget_bytes: u64,

    /// Cache root override (defaults to the platform cache directory)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Store directory name under the cache root
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Requested decode width
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    /// Requested decode height
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// Disk blob format (jpeg, png)
    #[serde(default)]
    pub encode_format: EncodeFormat,

    /// JPEG quality for disk blobs
    #[serde(default = "default_encode_quality")]
    pub encode_quality: u8,

    /// Key hashing (md5, sha256, hashcode)
    #[serde(default)]
    pub key_codec: KeyCodec,

    /// Worker units running at once
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Worker units admitted before requests are refused
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Network timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Download read buffer size
    #[serde(default = "default_io_buffer")]
    pub io_buffer_bytes: usize,

    /// Largest accepted download
    #[serde(default = "default_max_download")]
    pub max_download_bytes: u64,

    /// Blur radius for the blurred variant
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
}

fn default_true() -> bool {
    true
}

fn default_memory_budget() -> usize {
    16 * 1024 * 1024
}

fn default_disk_budget() -> u64 {
    10 * 1024 * 1024
}

fn default_store_name() -> String {
    paths::DEFAULT_STORE_NAME.to_string()
}

fn default_max_dimension() -> u32 {
    512
}

fn default_encode_quality() -> u8 {
    70
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_in_flight() -> usize {
    64
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_io_buffer() -> usize {
    8 * 1024
}

fn default_max_download() -> u64 {
    8 * 1024 * 1024
}

fn default_blur_sigma() -> f32 {
    12.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_cache_enabled: true,
            memory_budget_bytes: default_memory_budget(),
            disk_cache_enabled: true,
            disk_budget_bytes: default_disk_budget(),
            cache_dir: None,
            store_name: default_store_name(),
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            encode_format: EncodeFormat::default(),
            encode_quality: default_encode_quality(),
            key_codec: KeyCodec::default(),
            worker_threads: default_worker_threads(),
            max_in_flight: default_max_in_flight(),
            fetch_timeout_secs: default_fetch_timeout(),
            io_buffer_bytes: default_io_buffer(),
            max_download_bytes: default_max_download(),
            blur_sigma: default_blur_sigma(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Directory of the disk store (`<cache root>/<store name>`)
    pub fn store_dir(&self) -> Result<PathBuf> {
        let root = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => paths::cache_root()?,
        };
        Ok(paths::store_dir(&root, &self.store_name))
    }

    /// Disk tier settings
    pub fn disk_options(&self) -> Result<DiskOptions> {
        Ok(DiskOptions {
            directory: self.store_dir()?,
            max_size: self.disk_budget_bytes,
            app_version: DISK_FORMAT_VERSION,
        })
    }

    /// Decode settings
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_width: self.max_width,
            max_height: self.max_height,
            max_alloc: Some(decode::DEFAULT_MAX_ALLOC),
        }
    }

    /// Disk blob encoding
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            format: self.encode_format,
            quality: self.encode_quality,
        }
    }

    /// Transport settings
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            buffer_size: self.io_buffer_bytes.max(1),
            max_bytes: self.max_download_bytes,
            ..HttpOptions::default()
        }
    }
}
