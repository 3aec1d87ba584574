//! # artcache
//!
//! Bitmap acquisition and caching for music-library artwork.
//!
//! ## Overview
//!
//! artcache turns an artist or album identity into decoded pixels. Lookups
//! go through an in-memory LRU, a journal-backed disk store and finally the
//! device or the network, with at most one load in flight per display target
//! and stale results dropped when a target moves on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LoadController                         │
//! │  Per-target slots, generation tokens, bounded worker pool   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CacheCoordinator                        │
//! │      memory → disk → local artwork → remote candidates      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   MemoryCache   │ │    DiskStore    │ │  FetchPipeline  │
//! │                 │ │                 │ │                 │
//! │ • Byte budget   │ │ • Journal       │ │ • URL resolver  │
//! │ • LRU eviction  │ │ • Atomic blobs  │ │ • Bounded fetch │
//! │ • Statistics    │ │ • Pause gate    │ │ • Sampled decode│
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cache`] - Memory tier, cache keys and key hashing
//! - [`config`] - Configuration management
//! - [`coordinator`] - Tier fallback and write-back
//! - [`disk`] - Persistent journal-backed store
//! - [`error`] - Error taxonomy
//! - [`fetch`] - URL resolution, download and decoding
//! - [`loader`] - Per-target asynchronous loading
//! - [`models`] - Bitmaps, identities and requests
//! - [`paths`] - Cache and config locations
//! - [`telemetry`] - Logging setup
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use artcache::fetch::{HttpFetcher, UrlTemplateResolver};
//! use artcache::{ArtRequest, Bitmap, CacheCoordinator, CacheKey, Config, ImageSink, LoadController, TargetId};
//!
//! struct Print;
//!
//! impl ImageSink for Print {
//!     fn on_image_ready(&self, target: TargetId, key: &CacheKey, image: Bitmap, _blurred: Option<Bitmap>) {
//!         println!("{target}: {key} is {}x{}", image.width(), image.height());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     artcache::telemetry::init_tracing("warn");
//!     let config = Config::load()?;
//!     let resolver = UrlTemplateResolver::new()
//!         .with_album_template("https://art.example/{artist}/{album}/{size}.jpg");
//!     let coordinator = CacheCoordinator::from_config(
//!         &config,
//!         Arc::new(resolver),
//!         Arc::new(HttpFetcher::new(config.http_options())),
//!     )?;
//!     let loader = LoadController::from_config(Arc::new(coordinator), &config, Arc::new(Print))?;
//!     loader.request(TargetId(1), ArtRequest::album("Air", "Moon Safari"))?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/artcache/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::return_self_not_must_use)]

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod disk;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod models;
pub mod paths;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use cache::{CacheKey, CacheStats, ContentHash, KeyCodec, MemoryCache};
pub use config::Config;
pub use coordinator::{CacheCoordinator, CoordinatorStats};
pub use disk::{DiskStats, DiskStatus, DiskStore};
pub use error::{CacheError, Result};
pub use loader::{ImageSink, LoadController, RequestOutcome, TargetId, TargetState, WorkerPool};
pub use models::{ArtIdentity, ArtRequest, Bitmap, CallContext, CancelFlag, EncodeOptions, ImageType, Variant};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
