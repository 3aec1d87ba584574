//! On-device artwork lookup.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Source of artwork that ships with the local library
pub trait LocalArtwork: Send + Sync {
    /// Encoded bytes for `local_id`, or `None` if the device has none.
    fn load(&self, local_id: u64) -> Option<Vec<u8>>;
}

/// No local artwork at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalArtwork;

impl LocalArtwork for NoLocalArtwork {
    fn load(&self, _local_id: u64) -> Option<Vec<u8>> {
        None
    }
}

/// Artwork files named after their id: `<root>/<id>.jpg` and friends
#[derive(Debug, Clone)]
pub struct ArtworkDirectory {
    root: PathBuf,
}

impl ArtworkDirectory {
    const EXTENSIONS: [&'static str; 3] = ["jpg", "jpeg", "png"];

    /// Look for artwork under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LocalArtwork for ArtworkDirectory {
    fn load(&self, local_id: u64) -> Option<Vec<u8>> {
        for ext in Self::EXTENSIONS {
            let path = self.root.join(format!("{local_id}.{ext}"));
            match fs::read(&path) {
                Ok(bytes) if !bytes.is_empty() => return Some(bytes),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to read {}: {e}", path.display()),
            }
        }
        None
    }
}
