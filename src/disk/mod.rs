//! Persistent tier: content-addressed blobs behind a journal.
//!
//! [`DiskLruCache`] is the store itself. [`DiskStore`] wraps it for use on
//! the request path: it opens the store on a background thread, answers
//! "not found" until the store is ready (or forever, if opening failed), and
//! gates reads behind a pause switch.

mod editor;
mod gate;
mod journal;
mod lru;

pub use editor::{Editor, Snapshot};
pub use gate::PauseGate;
pub use lru::DiskLruCache;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::cache::ContentHash;
use crate::error::{CacheError, Result};
use crate::models::CallContext;

/// Default disk budget (10 MiB)
pub const DEFAULT_DISK_BUDGET: u64 = 10 * 1024 * 1024;

/// Bump when the blob encoding changes; older journals are then ignored.
pub const DISK_FORMAT_VERSION: u32 = 1;

/// Where and how large the disk store is
#[derive(Debug, Clone)]
pub struct DiskOptions {
    /// Store directory (`<cache-root>/<store-name>`)
    pub directory: PathBuf,
    /// Byte budget
    pub max_size: u64,
    /// Version written into the journal header
    pub app_version: u32,
}

impl DiskOptions {
    /// Options with the default budget
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size: DEFAULT_DISK_BUDGET,
            app_version: DISK_FORMAT_VERSION,
        }
    }

    /// Override the byte budget
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Lifecycle of a [`DiskStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStatus {
    /// Background open still running
    Initializing,
    /// Ready for reads and writes
    Open,
    /// Opening failed or was skipped; the tier stays off for this process
    Disabled,
    /// Closed by the owner
    Closed,
}

/// Size figures for the disk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    /// Committed bytes
    pub size: u64,
    /// Byte budget
    pub max_size: u64,
    /// Committed entries
    pub entries: usize,
}

enum Slot {
    Initializing,
    Open(DiskLruCache),
    Disabled,
    Closed,
}

struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
    gate: PauseGate,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_init(&self, opened: Result<DiskLruCache>) {
        let mut slot = self.lock();
        let closed = matches!(*slot, Slot::Closed);
        match opened {
            Ok(cache) if closed => {
                let _ = cache.close();
            }
            Ok(cache) => {
                tracing::info!(
                    "Disk cache ready at {} ({} of {} bytes used)",
                    cache.directory().display(),
                    cache.size(),
                    cache.max_size()
                );
                *slot = Slot::Open(cache);
            }
            Err(_) if closed => {}
            Err(e) => {
                tracing::warn!("Disk cache disabled: {e}");
                *slot = Slot::Disabled;
            }
        }
        self.ready.notify_all();
    }
}

/// Disk tier as seen from the request path.
///
/// Every method is non-failing from the caller's point of view: while the
/// store is initializing, disabled or closed, reads miss and writes are
/// refused.
#[derive(Clone)]
pub struct DiskStore {
    shared: Arc<Shared>,
}

impl DiskStore {
    fn with_slot(slot: Slot) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(slot),
                ready: Condvar::new(),
                gate: PauseGate::new(),
            }),
        }
    }

    /// Start opening the store on a dedicated thread and return at once.
    pub fn open_in_background(options: DiskOptions) -> Self {
        let store = Self::with_slot(Slot::Initializing);
        let shared = Arc::clone(&store.shared);
        let spawned = thread::Builder::new()
            .name("artcache-disk-init".to_string())
            .spawn(move || shared.finish_init(initialize(&options)));
        if let Err(e) = spawned {
            store.shared.finish_init(Err(e.into()));
        }
        store
    }

    /// Open the store on the calling thread.
    pub fn open_blocking(options: DiskOptions) -> Self {
        let store = Self::with_slot(Slot::Initializing);
        store.shared.finish_init(initialize(&options));
        store
    }

    /// A store that never holds anything
    pub fn disabled() -> Self {
        Self::with_slot(Slot::Disabled)
    }

    fn cache(&self) -> Option<DiskLruCache> {
        match &*self.shared.lock() {
            Slot::Open(cache) => Some(cache.clone()),
            _ => None,
        }
    }

    /// Current lifecycle state
    pub fn status(&self) -> DiskStatus {
        match &*self.shared.lock() {
            Slot::Initializing => DiskStatus::Initializing,
            Slot::Open(_) => DiskStatus::Open,
            Slot::Disabled => DiskStatus::Disabled,
            Slot::Closed => DiskStatus::Closed,
        }
    }

    /// Whether reads and writes currently reach the disk
    pub fn is_open(&self) -> bool {
        self.status() == DiskStatus::Open
    }

    /// Block until initialization finishes or `timeout` passes.
    pub fn wait_ready(&self, timeout: Duration) -> DiskStatus {
        let slot = self.shared.lock();
        let (slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, timeout, |s| matches!(s, Slot::Initializing))
            .unwrap_or_else(PoisonError::into_inner);
        drop(slot);
        self.status()
    }

    /// Read a blob.
    ///
    /// A store that is not open misses at once, paused or not. While an
    /// open store is paused, background callers wait for
    /// [`set_paused(false)`] and foreground callers get `None` immediately.
    ///
    /// [`set_paused(false)`]: Self::set_paused
    pub fn get(&self, hash: &ContentHash, ctx: CallContext) -> Option<Snapshot> {
        let cache = self.cache()?;
        if !self.shared.gate.pass(ctx) {
            return None;
        }
        match cache.get(hash.as_str()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Disk cache read of {hash} failed: {e}");
                None
            }
        }
    }

    /// Whether a committed blob exists
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.cache().is_some_and(|c| c.contains(hash.as_str()))
    }

    /// Start a write transaction.
    ///
    /// `None` when the store is unavailable or the hash is already being
    /// written.
    pub fn put(&self, hash: &ContentHash) -> Option<Editor> {
        let cache = self.cache()?;
        match cache.edit(hash.as_str()) {
            Ok(editor) => editor,
            Err(e) => {
                tracing::warn!("Disk cache write of {hash} failed: {e}");
                None
            }
        }
    }

    /// Delete a blob
    pub fn remove(&self, hash: &ContentHash) -> bool {
        let Some(cache) = self.cache() else {
            return false;
        };
        cache.remove(hash.as_str()).unwrap_or_else(|e| {
            tracing::warn!("Disk cache removal of {hash} failed: {e}");
            false
        })
    }

    /// Flush the journal
    pub fn flush(&self) -> Result<()> {
        self.cache().ok_or(CacheError::DiskUnavailable)?.flush()
    }

    /// Delete every blob
    pub fn clear(&self) -> Result<()> {
        self.cache().ok_or(CacheError::DiskUnavailable)?.clear()
    }

    /// Close the store and release paused readers.
    pub fn close(&self) -> Result<()> {
        self.shared.gate.close();
        let previous = std::mem::replace(&mut *self.shared.lock(), Slot::Closed);
        self.shared.ready.notify_all();
        match previous {
            Slot::Open(cache) => cache.close(),
            _ => Ok(()),
        }
    }

    /// Pause or resume reads
    pub fn set_paused(&self, paused: bool) {
        self.shared.gate.set_paused(paused);
    }

    /// Whether reads are paused
    pub fn is_paused(&self) -> bool {
        self.shared.gate.is_paused()
    }

    /// Size figures, if the store is open
    pub fn stats(&self) -> Option<DiskStats> {
        self.cache().map(|cache| DiskStats {
            size: cache.size(),
            max_size: cache.max_size(),
            entries: cache.len(),
        })
    }
}

impl std::fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStore")
            .field("status", &self.status())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Create the directory, check free space and open the journal.
fn initialize(options: &DiskOptions) -> Result<DiskLruCache> {
    fs::create_dir_all(&options.directory)?;
    let available = fs2::available_space(&options.directory)?;
    if available <= options.max_size {
        tracing::info!(
            "Only {available} bytes free under {}, skipping disk cache (budget {})",
            options.directory.display(),
            options.max_size
        );
        return Err(CacheError::DiskUnavailable);
    }
    DiskLruCache::open(&options.directory, options.app_version, options.max_size)
}
