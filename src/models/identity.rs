//! Artwork identity and request types

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;

/// Which kind of artwork is wanted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Album cover
    #[default]
    Album,
    /// Artist portrait
    Artist,
}

impl ImageType {
    /// Lowercase name, used in logs and URL templates
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Artist => "artist",
        }
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic identity of a piece of artwork
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ArtIdentity {
    /// Artist name
    pub artist: String,
    /// Album title, absent for artist portraits
    #[serde(default)]
    pub album: Option<String>,
    /// Song title, when the request comes from a track
    #[serde(default)]
    pub song: Option<String>,
    /// Id of artwork stored on the device, if the library knows one
    #[serde(default)]
    pub local_id: Option<u64>,
}

impl ArtIdentity {
    /// Identity of an album cover
    pub fn album(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: Some(album.into()),
            ..Self::default()
        }
    }

    /// Identity of an artist portrait
    pub fn artist(artist: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            ..Self::default()
        }
    }

    /// Attach a song title
    pub fn with_song(mut self, song: impl Into<String>) -> Self {
        self.song = Some(song.into());
        self
    }

    /// Attach an on-device artwork id
    pub fn with_local_id(mut self, local_id: u64) -> Self {
        self.local_id = Some(local_id);
        self
    }
}

/// Whether a derived variant should accompany the primary image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Only the primary image
    #[default]
    Primary,
    /// Primary image plus a blurred copy
    WithBlur,
}

/// Everything the coordinator needs to resolve one image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtRequest {
    /// Cache key
    pub key: CacheKey,
    /// What the image depicts
    pub identity: ArtIdentity,
    /// Album cover or artist portrait
    pub image_type: ImageType,
    /// Requested variants
    pub variant: Variant,
}

impl ArtRequest {
    /// Request an album cover keyed by album and artist.
    pub fn album(artist: &str, album: &str) -> Self {
        Self {
            key: CacheKey::album(artist, album),
            identity: ArtIdentity::album(artist, album),
            image_type: ImageType::Album,
            variant: Variant::Primary,
        }
    }

    /// Request an artist portrait keyed by artist name.
    pub fn artist(artist: &str) -> Self {
        Self {
            key: CacheKey::artist(artist),
            identity: ArtIdentity::artist(artist),
            image_type: ImageType::Artist,
            variant: Variant::Primary,
        }
    }

    /// Request with an explicit key and identity
    pub fn new(key: CacheKey, identity: ArtIdentity, image_type: ImageType) -> Self {
        Self {
            key,
            identity,
            image_type,
            variant: Variant::Primary,
        }
    }

    /// Ask for a blurred copy alongside the primary image
    pub fn with_blur(mut self) -> Self {
        self.variant = Variant::WithBlur;
        self
    }

    /// Whether two requests would produce the same delivery
    pub fn same_target_result(&self, other: &Self) -> bool {
        self.key == other.key && self.variant == other.variant
    }
}
