//! Tier fallback and write-back.
//!
//! Resolution order is memory, disk, on-device artwork, then each remote
//! candidate in turn. Whatever is found is written back to memory, and to
//! disk unless it came from there.

use std::io::Write;
use std::sync::Arc;

use crate::cache::{CacheKey, CacheStats, ContentHash, KeyCodec, MemoryCache};
use crate::config::Config;
use crate::disk::{DiskStats, DiskStore, Editor};
use crate::error::{CacheError, Result};
use crate::fetch::{FetchPipeline, Fetcher, LocalArtwork, NoLocalArtwork, SourceResolver};
use crate::models::{ArtRequest, Bitmap, CallContext, CancelFlag, EncodeOptions, Variant};

/// Suffix of the memory key holding the blurred variant
pub const BLUR_SUFFIX: &str = "blur";

/// Snapshot of both tiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorStats {
    /// Memory tier, if enabled
    pub memory: Option<CacheStats>,
    /// Disk tier, if open
    pub disk: Option<DiskStats>,
}

/// Where a resolved image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Disk,
    Local,
    Network,
}

/// Public synchronous face of the cache.
///
/// Shared between the loader and the host through an `Arc`. `resolve` and
/// friends block on disk and network I/O and belong on worker threads;
/// [`memory_lookup`](Self::memory_lookup) is safe anywhere.
pub struct CacheCoordinator {
    memory: Option<MemoryCache>,
    disk: Option<DiskStore>,
    codec: KeyCodec,
    resolver: Arc<dyn SourceResolver>,
    local: Arc<dyn LocalArtwork>,
    pipeline: FetchPipeline,
    encoding: EncodeOptions,
    blur_sigma: f32,
}

impl CacheCoordinator {
    /// Assemble a coordinator from explicit parts. Either tier may be absent.
    pub fn new(
        memory: Option<MemoryCache>,
        disk: Option<DiskStore>,
        pipeline: FetchPipeline,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        Self {
            memory,
            disk,
            codec: KeyCodec::default(),
            resolver,
            local: Arc::new(NoLocalArtwork),
            pipeline,
            encoding: EncodeOptions::default(),
            blur_sigma: 12.0,
        }
    }

    /// Build both tiers from configuration. The disk tier opens in the
    /// background.
    pub fn from_config(
        config: &Config,
        resolver: Arc<dyn SourceResolver>,
        fetcher: Arc<dyn Fetcher>,
    ) -> anyhow::Result<Self> {
        let memory = config
            .memory_cache_enabled
            .then(|| MemoryCache::new(config.memory_budget_bytes));
        let disk = if config.disk_cache_enabled {
            Some(DiskStore::open_in_background(config.disk_options()?))
        } else {
            None
        };
        let pipeline = FetchPipeline::new(fetcher, config.decode_options());
        Ok(Self::new(memory, disk, pipeline, resolver)
            .with_codec(config.key_codec)
            .with_encoding(config.encode_options())
            .with_blur_sigma(config.blur_sigma))
    }

    /// Use on-device artwork before going to the network
    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn LocalArtwork>) -> Self {
        self.local = local;
        self
    }

    /// Change how keys map to disk file names
    #[must_use]
    pub fn with_codec(mut self, codec: KeyCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Change the disk blob encoding
    #[must_use]
    pub fn with_encoding(mut self, encoding: EncodeOptions) -> Self {
        self.encoding = encoding;
        self
    }

    /// Change the blur radius of the secondary variant
    #[must_use]
    pub fn with_blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = sigma;
        self
    }

    /// Memory tier
    pub fn memory(&self) -> Option<&MemoryCache> {
        self.memory.as_ref()
    }

    /// Disk tier
    pub fn disk(&self) -> Option<&DiskStore> {
        self.disk.as_ref()
    }

    /// Disk file name of `key`
    pub fn content_hash(&self, key: &CacheKey) -> ContentHash {
        self.codec.digest(key)
    }

    /// Non-blocking memory probe
    pub fn memory_lookup(&self, key: &CacheKey) -> Option<Bitmap> {
        self.memory.as_ref()?.get(key)
    }

    /// Everything a request needs, from memory only.
    ///
    /// For [`Variant::WithBlur`] both images must be resident.
    pub fn memory_lookup_request(&self, request: &ArtRequest) -> Option<(Bitmap, Option<Bitmap>)> {
        let primary = self.memory_lookup(&request.key)?;
        match request.variant {
            Variant::Primary => Some((primary, None)),
            Variant::WithBlur => {
                let blurred = self.memory_lookup(&request.key.variant(BLUR_SUFFIX))?;
                Some((primary, Some(blurred)))
            }
        }
    }

    /// Resolve from a worker thread, never cancelled.
    pub fn resolve(&self, request: &ArtRequest) -> Option<Bitmap> {
        self.resolve_with(request, &CancelFlag::new(), CallContext::Background)
    }

    /// Resolve through every tier, stopping early once `cancel` is raised.
    pub fn resolve_with(
        &self,
        request: &ArtRequest,
        cancel: &CancelFlag,
        ctx: CallContext,
    ) -> Option<Bitmap> {
        if let Some(bitmap) = self.memory_lookup(&request.key) {
            tracing::debug!("Memory hit for {}", request.key);
            return Some(bitmap);
        }
        match self.resolve_uncached(request, cancel, ctx) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Giving up on {}: {e}", request.key);
                if matches!(e, CacheError::OutOfMemory { .. })
                    && let Some(memory) = &self.memory
                {
                    memory.evict_all();
                }
                None
            }
        }
    }

    /// Resolve the primary image plus the blurred variant when requested.
    pub fn resolve_variant(
        &self,
        request: &ArtRequest,
        cancel: &CancelFlag,
        ctx: CallContext,
    ) -> Option<(Bitmap, Option<Bitmap>)> {
        let primary = self.resolve_with(request, cancel, ctx)?;
        if request.variant == Variant::Primary {
            return Some((primary, None));
        }
        let blur_key = request.key.variant(BLUR_SUFFIX);
        if let Some(blurred) = self.memory_lookup(&blur_key) {
            return Some((primary, Some(blurred)));
        }
        if cancel.is_cancelled() {
            return None;
        }
        let blurred = self.pipeline.blur(&primary, self.blur_sigma);
        self.remember(&blur_key, &blurred);
        Some((primary, Some(blurred)))
    }

    /// Only `OutOfMemory` escapes; every other failure falls through to the
    /// next source.
    fn resolve_uncached(
        &self,
        request: &ArtRequest,
        cancel: &CancelFlag,
        ctx: CallContext,
    ) -> Result<Option<Bitmap>> {
        let hash = self.codec.digest(&request.key);

        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(bitmap) = self.disk_lookup(&request.key, &hash, ctx)? {
            return Ok(Some(self.write_back(request, &hash, bitmap, Origin::Disk)));
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(local_id) = request.identity.local_id
            && let Some(bytes) = self.local.load(local_id)
            && let Some(bitmap) = self.decode_or_skip(&bytes, "local artwork")?
        {
            return Ok(Some(self.write_back(request, &hash, bitmap, Origin::Local)));
        }

        for url in self
            .resolver
            .candidate_urls(&request.identity, request.image_type)
        {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(bytes) = self.pipeline.fetch(&url) else {
                continue;
            };
            if let Some(bitmap) = self.decode_or_skip(&bytes, &url)? {
                return Ok(Some(self.write_back(request, &hash, bitmap, Origin::Network)));
            }
        }

        tracing::debug!("No artwork found for {}", request.key);
        Ok(None)
    }

    fn disk_lookup(
        &self,
        key: &CacheKey,
        hash: &ContentHash,
        ctx: CallContext,
    ) -> Result<Option<Bitmap>> {
        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let Some(snapshot) = disk.get(hash, ctx) else {
            return Ok(None);
        };
        let decoded = snapshot
            .read_all()
            .map_err(CacheError::from)
            .and_then(|bytes| self.pipeline.decode(&bytes));
        match decoded {
            Ok(bitmap) => {
                tracing::debug!("Disk hit for {key}");
                Ok(Some(bitmap))
            }
            Err(e @ CacheError::OutOfMemory { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Dropping unreadable disk record for {key}: {e}");
                disk.remove(hash);
                Ok(None)
            }
        }
    }

    fn decode_or_skip(&self, bytes: &[u8], source: &str) -> Result<Option<Bitmap>> {
        match self.pipeline.decode(bytes) {
            Ok(bitmap) => Ok(Some(bitmap)),
            Err(e @ CacheError::OutOfMemory { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Failed to decode {source}: {e}");
                Ok(None)
            }
        }
    }

    fn write_back(&self, request: &ArtRequest, hash: &ContentHash, bitmap: Bitmap, origin: Origin) -> Bitmap {
        tracing::debug!("Resolved {} from {origin:?}", request.key);
        self.remember(&request.key, &bitmap);
        if origin != Origin::Disk {
            self.persist(hash, &bitmap);
        }
        bitmap
    }

    fn remember(&self, key: &CacheKey, bitmap: &Bitmap) {
        if let Some(memory) = &self.memory
            && let Err(e) = memory.put(key.clone(), bitmap.clone())
        {
            tracing::warn!("Not caching {key} in memory: {e}");
        }
    }

    fn persist(&self, hash: &ContentHash, bitmap: &Bitmap) {
        let Some(disk) = &self.disk else {
            return;
        };
        if disk.contains(hash) {
            return;
        }
        let Some(mut editor) = disk.put(hash) else {
            return;
        };
        if let Err(e) = self.write_blob(&mut editor, bitmap) {
            tracing::warn!("Failed to write {hash} to disk: {e}");
            return;
        }
        if let Err(e) = editor.commit() {
            tracing::warn!("Failed to commit {hash} to disk: {e}");
        }
    }

    fn write_blob(&self, editor: &mut Editor, bitmap: &Bitmap) -> Result<()> {
        let blob = bitmap.encode(self.encoding)?;
        editor.write_all(&blob)?;
        Ok(())
    }

    /// Store an image supplied by the host in both tiers, replacing any
    /// previous one.
    pub fn put(&self, key: &CacheKey, bitmap: &Bitmap) {
        let hash = self.codec.digest(key);
        if let Some(disk) = &self.disk {
            disk.remove(&hash);
        }
        self.remember(key, bitmap);
        if let Some(memory) = &self.memory {
            memory.remove(&key.variant(BLUR_SUFFIX));
        }
        self.persist(&hash, bitmap);
    }

    /// Forget `key` in both tiers, including its blurred variant.
    pub fn remove(&self, key: &CacheKey) {
        if let Some(memory) = &self.memory {
            memory.remove(key);
            memory.remove(&key.variant(BLUR_SUFFIX));
        }
        if let Some(disk) = &self.disk {
            disk.remove(&self.codec.digest(key));
        }
    }

    /// Drop every decoded image
    pub fn evict_all(&self) {
        if let Some(memory) = &self.memory {
            memory.evict_all();
        }
    }

    /// Drop everything in both tiers
    pub fn clear_all(&self) {
        self.evict_all();
        if let Some(disk) = &self.disk
            && let Err(e) = disk.clear()
        {
            tracing::warn!("Failed to clear disk cache: {e}");
        }
    }

    /// Pause or resume background disk reads
    pub fn set_paused(&self, paused: bool) {
        if let Some(disk) = &self.disk {
            disk.set_paused(paused);
        }
    }

    /// Flush the disk journal. A disk tier that is not open has nothing to flush.
    pub fn flush(&self) -> Result<()> {
        match self.disk.as_ref().map(DiskStore::flush) {
            Some(Err(CacheError::DiskUnavailable)) | None => Ok(()),
            Some(result) => result,
        }
    }

    /// Close the disk tier. Later disk lookups miss.
    pub fn close(&self) -> Result<()> {
        match &self.disk {
            Some(disk) => disk.close(),
            None => Ok(()),
        }
    }

    /// Size and hit figures for both tiers
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            memory: self.memory.as_ref().map(MemoryCache::stats),
            disk: self.disk.as_ref().and_then(DiskStore::stats),
        }
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("memory", &self.memory.is_some())
            .field("disk", &self.disk)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskOptions;
    use crate::fetch::{ArtworkDirectory, DecodeOptions};
    use crate::models::{ArtIdentity, EncodeFormat, ImageType};
    use crate::test_support::{FakeFetcher, mem_resolver, png_bytes};
    use std::path::Path;
    use tempfile::tempdir;

    const MEGA: &str = "mem://Air/Moon%20Safari/mega";
    const LARGE: &str = "mem://Air/Moon%20Safari/large";

    fn request() -> ArtRequest {
        ArtRequest::album("Air", "Moon Safari")
    }

    fn disk(dir: &Path) -> DiskStore {
        DiskStore::open_blocking(DiskOptions::new(dir).with_max_size(1024 * 1024))
    }

    fn coordinator(fetcher: &Arc<FakeFetcher>, disk: Option<DiskStore>) -> CacheCoordinator {
        let pipeline = FetchPipeline::new(fetcher.clone(), DecodeOptions::default());
        CacheCoordinator::new(
            Some(MemoryCache::new(1024 * 1024)),
            disk,
            pipeline,
            Arc::new(mem_resolver()),
        )
        .with_encoding(EncodeOptions {
            format: EncodeFormat::Png,
            quality: 100,
        })
    }

    #[test]
    fn test_network_result_written_to_both_tiers() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(8, 8));
        let coord = coordinator(&fetcher, Some(disk(dir.path())));

        let bitmap = coord.resolve(&request()).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (8, 8));
        assert!(coord.memory_lookup(&request().key).is_some());
        assert!(coord.disk().unwrap().contains(&coord.content_hash(&request().key)));

        coord.resolve(&request()).unwrap();
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn test_disk_hit_promoted_to_memory() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(8, 8));
        coordinator(&fetcher, Some(disk(dir.path())))
            .resolve(&request())
            .unwrap();
        assert_eq!(fetcher.call_count(), 1);

        // fresh memory tier over the same directory
        let coord = coordinator(&fetcher, Some(disk(dir.path())));
        assert!(coord.memory_lookup(&request().key).is_none());
        let bitmap = coord.resolve(&request()).unwrap();
        assert_eq!(bitmap.width(), 8);
        assert_eq!(fetcher.call_count(), 1);
        assert!(coord.memory_lookup(&request().key).is_some());
    }

    #[test]
    fn test_candidates_tried_in_order() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(LARGE, png_bytes(4, 4));
        let coord = coordinator(&fetcher, None);

        assert!(coord.resolve(&request()).is_some());
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], MEGA);
        assert_eq!(calls[2], LARGE);
    }

    #[test]
    fn test_undecodable_candidate_is_skipped() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, b"<html>not found</html>".to_vec());
        fetcher.serve(LARGE, png_bytes(4, 4));
        let coord = coordinator(&fetcher, None);
        assert_eq!(coord.resolve(&request()).unwrap().width(), 4);
    }

    #[test]
    fn test_nothing_found_is_none() {
        let fetcher = Arc::new(FakeFetcher::new());
        let coord = coordinator(&fetcher, None);
        assert!(coord.resolve(&request()).is_none());
        assert_eq!(fetcher.call_count(), 5);
    }

    #[test]
    fn test_corrupt_disk_record_removed() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(8, 8));
        let coord = coordinator(&fetcher, Some(disk(dir.path())));
        let hash = coord.content_hash(&request().key);

        let mut editor = coord.disk().unwrap().put(&hash).unwrap();
        editor.write_all(b"garbage").unwrap();
        editor.commit().unwrap();

        assert!(coord.resolve(&request()).is_some());
        assert_eq!(fetcher.call_count(), 1);
        let snapshot = coord.disk().unwrap().get(&hash, CallContext::Background).unwrap();
        assert_ne!(snapshot.read_all().unwrap(), b"garbage");
    }

    #[test]
    fn test_out_of_memory_evicts_and_stops() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(64, 64));
        fetcher.serve(LARGE, png_bytes(2, 2));
        let pipeline = FetchPipeline::new(
            fetcher.clone(),
            DecodeOptions {
                max_alloc: Some(1024),
                ..DecodeOptions::default()
            },
        );
        let coord = CacheCoordinator::new(
            Some(MemoryCache::new(1024 * 1024)),
            None,
            pipeline,
            Arc::new(mem_resolver()),
        );
        let other = CacheKey::new("other");
        coord
            .memory()
            .unwrap()
            .put(other.clone(), Bitmap::new(image::DynamicImage::new_rgba8(2, 2)))
            .unwrap();

        assert!(coord.resolve(&request()).is_none());
        assert!(coord.memory_lookup(&other).is_none());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn test_large_cover_resolves_without_evicting() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(2048, 2048));
        let pipeline = FetchPipeline::new(
            fetcher.clone(),
            DecodeOptions {
                max_alloc: Some(4 * 1024 * 1024),
                ..DecodeOptions::default()
            },
        );
        let coord = CacheCoordinator::new(
            Some(MemoryCache::new(4 * 1024 * 1024)),
            None,
            pipeline,
            Arc::new(mem_resolver()),
        );
        let other = CacheKey::new("other");
        coord
            .memory()
            .unwrap()
            .put(other.clone(), Bitmap::new(image::DynamicImage::new_rgba8(2, 2)))
            .unwrap();

        let bitmap = coord.resolve(&request()).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (512, 512));
        assert!(coord.memory_lookup(&other).is_some());
    }

    #[test]
    fn test_cancelled_before_start_does_nothing() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(4, 4));
        let coord = coordinator(&fetcher, None);
        let cancel = CancelFlag::new();
        cancel.cancel();

        assert!(coord.resolve_with(&request(), &cancel, CallContext::Background).is_none());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn test_local_artwork_before_network() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("9.png"), png_bytes(6, 6)).unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        let coord = coordinator(&fetcher, None).with_local(Arc::new(ArtworkDirectory::new(dir.path())));

        let request = ArtRequest::new(
            CacheKey::album("Air", "Moon Safari"),
            ArtIdentity::album("Air", "Moon Safari").with_local_id(9),
            ImageType::Album,
        );
        assert_eq!(coord.resolve(&request).unwrap().width(), 6);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn test_blur_variant_cached_in_memory() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(8, 8));
        let coord = coordinator(&fetcher, None).with_blur_sigma(1.5);
        let request = request().with_blur();

        assert!(coord.memory_lookup_request(&request).is_none());
        let (primary, blurred) = coord
            .resolve_variant(&request, &CancelFlag::new(), CallContext::Background)
            .unwrap();
        let blurred = blurred.unwrap();
        assert_eq!(blurred.width(), primary.width());

        let (_, cached) = coord.memory_lookup_request(&request).unwrap();
        assert!(cached.unwrap().ptr_eq(&blurred));
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(8, 8));
        let coord = coordinator(&fetcher, Some(disk(dir.path())));
        let key = request().key;
        let hash = coord.content_hash(&key);

        coord.resolve(&request()).unwrap();
        coord.remove(&key);
        assert!(coord.memory_lookup(&key).is_none());
        assert!(!coord.disk().unwrap().contains(&hash));

        coord.put(&key, &Bitmap::new(image::DynamicImage::new_rgba8(3, 3)));
        assert_eq!(coord.stats().disk.unwrap().entries, 1);
        coord.clear_all();
        let stats = coord.stats();
        assert_eq!(stats.memory.unwrap().entries, 0);
        assert_eq!(stats.disk.unwrap().entries, 0);
    }

    #[test]
    fn test_tiers_disabled_still_resolves() {
        let fetcher = Arc::new(FakeFetcher::new());
        fetcher.serve(MEGA, png_bytes(4, 4));
        let coord = CacheCoordinator::new(
            None,
            None,
            FetchPipeline::new(fetcher.clone(), DecodeOptions::default()),
            Arc::new(mem_resolver()),
        );
        assert!(coord.resolve(&request()).is_some());
        assert!(coord.resolve(&request()).is_some());
        assert_eq!(fetcher.call_count(), 2);
        coord.flush().unwrap();
    }

    #[test]
    fn test_from_config() {
        let dir = tempdir().unwrap();
        let config = Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let coord = CacheCoordinator::from_config(
            &config,
            Arc::new(mem_resolver()),
            Arc::new(FakeFetcher::new()),
        )
        .unwrap();
        let disk = coord.disk().unwrap();
        assert_eq!(
            disk.wait_ready(std::time::Duration::from_secs(10)),
            crate::disk::DiskStatus::Open
        );
        assert!(dir.path().join("artwork").join("journal").exists());
        coord.close().unwrap();
    }
}
