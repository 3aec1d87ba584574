//! Cache keys and their filesystem-safe digests

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Suffix appended to album keys before encoding
pub const ALBUM_KEY_SUFFIX: &str = "album";

/// Suffix appended to artist keys before encoding
pub const ARTIST_KEY_SUFFIX: &str = "artist";

/// Opaque logical identity of an image.
///
/// The engine never interprets the contents; callers are responsible for
/// keeping distinct images on distinct keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Wrap a caller-supplied key
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Key for an album cover: `base64url("{album}_{artist}_album")`.
    ///
    /// Arguments run artist first, like every other album constructor.
    pub fn album(artist: &str, album: &str) -> Self {
        Self::encoded(&format!("{album}_{artist}_{ALBUM_KEY_SUFFIX}"))
    }

    /// Key for an artist portrait: `base64url("{artist}_artist")`.
    pub fn artist(artist: &str) -> Self {
        Self::encoded(&format!("{artist}_{ARTIST_KEY_SUFFIX}"))
    }

    /// Key of a derived variant of this image (e.g. `"blur"`).
    pub fn variant(&self, suffix: &str) -> Self {
        Self::new(format!("{}#{suffix}", self.0))
    }

    fn encoded(raw: &str) -> Self {
        Self::new(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:?})", &*self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Lowercase hex digest of a [`CacheKey`], used as a disk file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest used to turn keys into file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCodec {
    /// MD5, 32 hex characters
    #[default]
    Md5,
    /// SHA-256, 64 hex characters
    Sha256,
    /// 64-bit FNV-1a, 16 hex characters.
    ///
    /// Stable across runs but collides far more often than a real digest;
    /// only meant as a degraded fallback.
    HashCode,
}

impl KeyCodec {
    /// Digest a key. Same input gives the same output in every process.
    pub fn digest(self, key: &CacheKey) -> ContentHash {
        let bytes = key.as_str().as_bytes();
        let hex = match self {
            Self::Md5 => format!("{:x}", md5::compute(bytes)),
            Self::Sha256 => Sha256::digest(bytes)
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect(),
            Self::HashCode => format!("{:016x}", fnv1a(bytes)),
        };
        ContentHash(hex)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_filename_safe(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn test_md5_known_value() {
        let hash = KeyCodec::Md5.digest(&CacheKey::new("abc"));
        assert_eq!(hash.as_str(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_digest_lengths() {
        let key = CacheKey::new("Radiohead/OK Computer");
        assert_eq!(KeyCodec::Md5.digest(&key).as_str().len(), 32);
        assert_eq!(KeyCodec::Sha256.digest(&key).as_str().len(), 64);
        assert_eq!(KeyCodec::HashCode.digest(&key).as_str().len(), 16);
    }

    #[test]
    fn test_digest_is_deterministic_and_safe() {
        let key = CacheKey::new("Sigur Rós – ( ) / 🎵 \\ : * ? \" < > |".repeat(40));
        for codec in [KeyCodec::Md5, KeyCodec::Sha256, KeyCodec::HashCode] {
            let a = codec.digest(&key);
            let b = codec.digest(&key.clone());
            assert_eq!(a, b);
            assert!(is_filename_safe(a.as_str()), "{codec:?} produced {a}");
        }
    }

    #[test]
    fn test_album_key_encoding() {
        let key = CacheKey::album("Radiohead", "Kid A");
        let decoded = URL_SAFE_NO_PAD.decode(key.as_str()).unwrap();
        assert_eq!(decoded, b"Kid A_Radiohead_album");
        assert!(!key.as_str().contains('/'));
        assert_ne!(key, CacheKey::artist("Radiohead"));
    }

    #[test]
    fn test_variant_key_differs() {
        let key = CacheKey::artist("Björk");
        let blur = key.variant("blur");
        assert_ne!(key, blur);
        assert!(blur.as_str().ends_with("#blur"));
    }
}
