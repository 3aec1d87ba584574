//! Source resolution, download and decoding.
//!
//! [`FetchPipeline`] turns a URL into a [`Bitmap`]: the [`Fetcher`] brings
//! the bytes in whole or not at all, then [`decode::decode_sampled`] probes
//! the dimensions and decodes at a reduced sample size.

pub mod decode;
mod http;
mod local;
mod resolver;

pub use decode::DecodeOptions;
pub use http::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_BYTES, Fetcher, HttpFetcher, HttpOptions};
pub use local::{ArtworkDirectory, LocalArtwork, NoLocalArtwork};
pub use resolver::{ImageSize, NoRemoteSource, SourceResolver, UrlTemplateResolver};

use std::sync::Arc;

use crate::error::Result;
use crate::models::Bitmap;

/// Download and decode stage shared by all worker units
#[derive(Clone)]
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    decode: DecodeOptions,
}

impl FetchPipeline {
    /// Pipeline over any fetcher
    pub fn new(fetcher: Arc<dyn Fetcher>, decode: DecodeOptions) -> Self {
        Self { fetcher, decode }
    }

    /// Pipeline backed by [`HttpFetcher`]
    pub fn http(options: HttpOptions, decode: DecodeOptions) -> Self {
        Self::new(Arc::new(HttpFetcher::new(options)), decode)
    }

    /// Decode settings in use
    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode
    }

    /// Fetch the bytes behind `url`; any failure is logged and reported as `None`.
    pub fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        match self.fetcher.fetch(url) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    /// Decode downloaded or stored bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<Bitmap> {
        decode::decode_sampled(bytes, &self.decode)
    }

    /// Derive the blurred variant.
    pub fn blur(&self, bitmap: &Bitmap, sigma: f32) -> Bitmap {
        decode::blur(bitmap, sigma)
    }
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("decode", &self.decode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    struct Failing;

    impl Fetcher for Failing {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            Err(CacheError::Fetch {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn test_fetch_failure_is_none() {
        let pipeline = FetchPipeline::new(Arc::new(Failing), DecodeOptions::default());
        assert!(pipeline.fetch("https://img.test/a.jpg").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let pipeline = FetchPipeline::new(Arc::new(Failing), DecodeOptions::default());
        assert!(pipeline.decode(b"definitely not an image").is_err());
    }
}
