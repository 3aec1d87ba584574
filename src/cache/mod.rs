//! In-memory tier and key handling.

mod key;
mod memory;

pub use key::{ALBUM_KEY_SUFFIX, ARTIST_KEY_SUFFIX, CacheKey, ContentHash, KeyCodec};
pub use memory::{CacheStats, MemoryCache};
