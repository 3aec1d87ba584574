//! Error types for the artwork cache
//!
//! "Not found" is never an error here: tiers report a miss with `None`.
//! These variants cover failures a tier logs before falling through, plus the
//! few conditions a caller has to react to (pool exhaustion, missing runtime).

use std::io;

use thiserror::Error;

/// Errors produced by the cache tiers, the fetch pipeline and the loader
#[derive(Debug, Error)]
pub enum CacheError {
    /// Disk or local file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A remote or local URL could not be fetched
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// URL that was requested
        url: String,
        /// Transport or status failure
        reason: String,
    },

    /// Bytes could not be decoded as an image
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// Decoding would exceed the configured allocation limit
    #[error("out of memory while decoding a {width}x{height} image")]
    OutOfMemory {
        /// Width of the bitmap that would have been allocated
        width: u32,
        /// Height of the bitmap that would have been allocated
        height: u32,
    },

    /// The disk journal is unreadable
    #[error("disk journal corrupt: {0}")]
    JournalCorrupt(String),

    /// Disk keys must be short, lowercase and filename safe
    #[error("invalid disk key: {0:?}")]
    InvalidKey(String),

    /// The sizer returned zero for an entry
    #[error("entry {key:?} has invalid size {size}")]
    InvalidEntrySize {
        /// Key of the rejected entry
        key: String,
        /// Size reported by the sizer
        size: usize,
    },

    /// The disk tier is initializing, disabled or closed
    #[error("disk cache unavailable")]
    DiskUnavailable,

    /// The disk cache was closed while an operation was in progress
    #[error("disk cache closed")]
    Closed,

    /// Every worker slot is taken
    #[error("worker pool exhausted ({capacity} units in flight)")]
    PoolExhausted {
        /// Configured admission capacity
        capacity: usize,
    },

    /// No tokio runtime available to run worker units
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}
