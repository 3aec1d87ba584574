//! Identity to candidate URL mapping.

use std::fmt;

use crate::models::{ArtIdentity, ImageType};

/// Size labels offered by artwork services, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSize {
    /// Largest available
    Mega,
    /// ~300px
    ExtraLarge,
    /// ~174px
    Large,
    /// ~64px
    Medium,
    /// ~34px
    Small,
}

impl ImageSize {
    /// Every size in preference order
    pub const PREFERENCE: [Self; 5] = [
        Self::Mega,
        Self::ExtraLarge,
        Self::Large,
        Self::Medium,
        Self::Small,
    ];

    /// Label substituted for `{size}`
    pub fn name(self) -> &'static str {
        match self {
            Self::Mega => "mega",
            Self::ExtraLarge => "extralarge",
            Self::Large => "large",
            Self::Medium => "medium",
            Self::Small => "small",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Produces candidate image URLs for an identity.
pub trait SourceResolver: Send + Sync {
    /// URLs to try, best quality first. Empty when there is no remote source.
    fn candidate_urls(&self, identity: &ArtIdentity, image_type: ImageType) -> Vec<String>;

    /// Best candidate, if any
    fn resolve_url(&self, identity: &ArtIdentity, image_type: ImageType) -> Option<String> {
        self.candidate_urls(identity, image_type).into_iter().next()
    }
}

/// Resolver that never finds anything remote
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteSource;

impl SourceResolver for NoRemoteSource {
    fn candidate_urls(&self, _identity: &ArtIdentity, _image_type: ImageType) -> Vec<String> {
        Vec::new()
    }
}

/// Builds URLs from templates.
///
/// Templates may use `{artist}`, `{album}` and `{size}`; values are
/// percent-encoded. A template containing `{size}` yields one URL per size
/// in [`ImageSize::PREFERENCE`] order.
///
/// ```
/// use artcache::fetch::{SourceResolver, UrlTemplateResolver};
/// use artcache::models::{ArtIdentity, ImageType};
///
/// let resolver = UrlTemplateResolver::new()
///     .with_album_template("https://art.example/{artist}/{album}.jpg");
/// let identity = ArtIdentity::album("Daft Punk", "Discovery");
/// assert_eq!(
///     resolver.resolve_url(&identity, ImageType::Album).as_deref(),
///     Some("https://art.example/Daft%20Punk/Discovery.jpg"),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlTemplateResolver {
    album_template: Option<String>,
    artist_template: Option<String>,
    sizes: Vec<ImageSize>,
}

impl UrlTemplateResolver {
    /// Resolver with no templates and every size
    pub fn new() -> Self {
        Self {
            sizes: ImageSize::PREFERENCE.to_vec(),
            ..Self::default()
        }
    }

    /// Template for album covers
    #[must_use]
    pub fn with_album_template(mut self, template: impl Into<String>) -> Self {
        self.album_template = Some(template.into());
        self
    }

    /// Template for artist pictures
    #[must_use]
    pub fn with_artist_template(mut self, template: impl Into<String>) -> Self {
        self.artist_template = Some(template.into());
        self
    }

    /// Restrict or reorder the sizes tried
    #[must_use]
    pub fn with_sizes(mut self, sizes: impl IntoIterator<Item = ImageSize>) -> Self {
        self.sizes = sizes.into_iter().collect();
        self
    }

    fn fill(template: &str, artist: &str, album: &str, size: ImageSize) -> String {
        template
            .replace("{artist}", &urlencoding::encode(artist))
            .replace("{album}", &urlencoding::encode(album))
            .replace("{size}", size.name())
    }
}

impl SourceResolver for UrlTemplateResolver {
    fn candidate_urls(&self, identity: &ArtIdentity, image_type: ImageType) -> Vec<String> {
        let (template, album) = match image_type {
            ImageType::Album => match (&self.album_template, &identity.album) {
                (Some(t), Some(album)) => (t, album.as_str()),
                _ => return Vec::new(),
            },
            ImageType::Artist => match &self.artist_template {
                Some(t) => (t, ""),
                None => return Vec::new(),
            },
        };
        if identity.artist.is_empty() {
            return Vec::new();
        }

        if !template.contains("{size}") {
            return vec![Self::fill(template, &identity.artist, album, ImageSize::Mega)];
        }
        self.sizes
            .iter()
            .map(|&size| Self::fill(template, &identity.artist, album, size))
            .collect()
    }
}
