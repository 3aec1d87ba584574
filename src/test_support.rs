//! Fakes shared by the coordinator and loader tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::{CacheError, Result};
use crate::fetch::{Fetcher, UrlTemplateResolver};
use crate::models::{Bitmap, EncodeFormat, EncodeOptions};

/// PNG bytes of a solid `width`x`height` image
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255])));
    Bitmap::new(image)
        .encode(EncodeOptions {
            format: EncodeFormat::Png,
            quality: 100,
        })
        .unwrap()
}

/// Resolver producing `mem://<artist>/<album>/<size>` candidates
pub(crate) fn mem_resolver() -> UrlTemplateResolver {
    UrlTemplateResolver::new()
        .with_album_template("mem://{artist}/{album}/{size}")
        .with_artist_template("mem://{artist}/{size}")
}

#[derive(Default)]
struct FetcherState {
    bodies: HashMap<String, Vec<u8>>,
    blocked: HashSet<String>,
    calls: Vec<String>,
}

/// In-memory fetcher with call recording and per-URL blocking
#[derive(Default)]
pub(crate) struct FakeFetcher {
    state: Mutex<FetcherState>,
    unblocked: Condvar,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, url: &str, body: Vec<u8>) {
        self.state.lock().unwrap().bodies.insert(url.to_string(), body);
    }

    pub(crate) fn block(&self, url: &str) {
        self.state.lock().unwrap().blocked.insert(url.to_string());
    }

    pub(crate) fn release(&self, url: &str) {
        self.state.lock().unwrap().blocked.remove(url);
        self.unblocked.notify_all();
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(url.to_string());
        let state = self
            .unblocked
            .wait_while(state, |s| s.blocked.contains(url))
            .unwrap();
        state.bodies.get(url).cloned().ok_or_else(|| CacheError::Fetch {
            url: url.to_string(),
            reason: "HTTP 404".to_string(),
        })
    }
}
