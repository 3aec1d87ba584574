//! Journal-backed LRU store of one blob per key.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use super::editor::{Editor, Snapshot};
use super::journal::{self, Record};
use crate::error::{CacheError, Result};

const JOURNAL: &str = "journal";
const JOURNAL_TMP: &str = "journal.tmp";
const JOURNAL_BACKUP: &str = "journal.bkp";
const HEADER_LINES: usize = 5;
const COMPACT_THRESHOLD: usize = 2000;
const MAX_KEY_LEN: usize = 120;

#[derive(Debug, Clone, Copy)]
struct Entry {
    length: u64,
    readable: bool,
    /// Id of the editor currently writing this entry
    edit: Option<u64>,
}

pub(crate) struct Inner {
    directory: PathBuf,
    app_version: u32,
    max_size: u64,
    size: u64,
    entries: LruCache<String, Entry>,
    journal: Option<BufWriter<File>>,
    redundant_ops: usize,
    next_edit: u64,
}

pub(crate) type Shared = Arc<Mutex<Inner>>;

pub(crate) fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent LRU cache storing one blob per key.
///
/// Blobs live in `<dir>/<key>.0`. Writes go to `<key>.0.tmp` and are renamed
/// into place on commit, so readers only ever see complete blobs. An
/// append-only journal records every edit, commit, removal and read; it is
/// replayed on open to rebuild the access order and compacted when it grows
/// mostly redundant.
#[derive(Clone)]
pub struct DiskLruCache {
    inner: Shared,
}

impl DiskLruCache {
    /// Open the cache in `directory`, creating it if needed.
    ///
    /// Fails with [`CacheError::JournalCorrupt`] if an existing journal cannot
    /// be understood; a journal written by a different `app_version` counts as
    /// corrupt.
    pub fn open(directory: impl Into<PathBuf>, app_version: u32, max_size: u64) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let journal_path = directory.join(JOURNAL);
        let backup_path = directory.join(JOURNAL_BACKUP);
        if backup_path.exists() {
            if journal_path.exists() {
                fs::remove_file(&backup_path)?;
            } else {
                fs::rename(&backup_path, &journal_path)?;
            }
        }

        let mut inner = Inner {
            directory,
            app_version,
            max_size,
            size: 0,
            entries: LruCache::unbounded(),
            journal: None,
            redundant_ops: 0,
            next_edit: 0,
        };

        if journal_path.exists() {
            let truncated = inner.read_journal()?;
            inner.process_journal()?;
            if truncated || inner.journal_needs_rebuild() {
                inner.rebuild_journal()?;
            } else {
                inner.journal = Some(open_append(&journal_path)?);
            }
            tracing::debug!(
                "Opened disk cache at {} with {} entries ({} bytes)",
                inner.directory.display(),
                inner.entries.len(),
                inner.size
            );
        } else {
            inner.rebuild_journal()?;
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Read a committed blob, marking it most recently used.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        validate_key(key)?;
        let mut inner = self.lock();
        inner.check_open()?;

        let length = match inner.entries.get(key) {
            Some(entry) if entry.readable => entry.length,
            _ => return Ok(None),
        };

        let file = match File::open(inner.clean_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Blob for {key} vanished from disk cache, dropping entry");
                inner.remove_entry(key)?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        inner.redundant_ops += 1;
        inner.append(&Record::Read(key.to_string()))?;
        if inner.journal_needs_rebuild() {
            inner.rebuild_journal()?;
        }
        Ok(Some(Snapshot::new(key, length, file)))
    }

    /// Whether a committed blob exists, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.peek(key).is_some_and(|e| e.readable)
    }

    /// Start writing a blob.
    ///
    /// Returns `None` if another editor is already writing this key.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        validate_key(key)?;
        let mut inner = self.lock();
        inner.check_open()?;

        let edit_id = inner.next_edit;
        if let Some(entry) = inner.entries.get_mut(key) {
            if entry.edit.is_some() {
                return Ok(None);
            }
            entry.edit = Some(edit_id);
        } else {
            inner.entries.put(
                key.to_string(),
                Entry {
                    length: 0,
                    readable: false,
                    edit: Some(edit_id),
                },
            );
        }
        inner.next_edit += 1;

        // flush before creating the file so a crash never leaks an untracked blob
        inner.append(&Record::Dirty(key.to_string()))?;
        inner.flush_journal()?;

        let tmp_path = inner.tmp_path(key);
        match File::create(&tmp_path) {
            Ok(file) => Ok(Some(Editor::new(
                Arc::clone(&self.inner),
                key.to_string(),
                edit_id,
                file,
            ))),
            Err(e) => {
                inner.complete_edit(key, edit_id, None)?;
                Err(e.into())
            }
        }
    }

    /// Delete a blob. Returns `false` if absent or being written.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut inner = self.lock();
        inner.check_open()?;
        let removed = inner.remove_entry(key)?;
        if inner.journal_needs_rebuild() {
            inner.rebuild_journal()?;
        }
        Ok(removed)
    }

    /// Trim to budget and flush the journal.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.check_open()?;
        inner.trim_to_size()?;
        inner.flush_journal()
    }

    /// Flush and close the journal. Later operations fail with
    /// [`CacheError::Closed`]; open editors can only abort.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.journal.is_none() {
            return Ok(());
        }
        inner.trim_to_size()?;
        inner.flush_journal()?;
        inner.journal = None;
        Ok(())
    }

    /// Delete every blob and start a fresh journal.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        if let Some(mut writer) = inner.journal.take() {
            let _ = writer.flush();
        }
        for dir_entry in fs::read_dir(&inner.directory)? {
            let path = dir_entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                remove_if_exists(&path)?;
            }
        }
        inner.entries.clear();
        inner.size = 0;
        inner.rebuild_journal()
    }

    /// Bytes currently committed
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    /// Byte budget
    pub fn max_size(&self) -> u64 {
        self.lock().max_size
    }

    /// Change the byte budget, evicting as needed.
    pub fn set_max_size(&self, max_size: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.max_size = max_size;
        if inner.journal.is_some() {
            inner.trim_to_size()?;
        }
        Ok(())
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.lock().entries.iter().filter(|(_, e)| e.readable).count()
    }

    /// Whether no committed entries exist
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.lock().journal.is_none()
    }

    /// Directory holding the journal and blobs
    pub fn directory(&self) -> PathBuf {
        self.lock().directory.clone()
    }
}

impl Inner {
    fn journal_path(&self) -> PathBuf {
        self.directory.join(JOURNAL)
    }

    fn clean_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.0"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.0.tmp"))
    }

    fn check_open(&self) -> Result<()> {
        if self.journal.is_some() {
            Ok(())
        } else {
            Err(CacheError::Closed)
        }
    }

    /// Replay the journal. Returns whether the last line was truncated.
    fn read_journal(&mut self) -> Result<bool> {
        let text = fs::read_to_string(self.journal_path()).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                CacheError::JournalCorrupt("journal is not valid UTF-8".to_string())
            } else {
                CacheError::Io(e)
            }
        })?;
        let (lines, truncated) = journal::split_lines(&text);
        journal::check_header(&lines, self.app_version)?;

        let body = &lines[HEADER_LINES..];
        for line in body {
            self.apply(Record::parse(line)?);
        }
        self.redundant_ops = body.len().saturating_sub(self.entries.len());

        if truncated {
            tracing::warn!(
                "Disk cache journal in {} ends with a partial record, rebuilding",
                self.directory.display()
            );
        }
        Ok(truncated)
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Clean(key, length) => {
                self.entries.put(
                    key,
                    Entry {
                        length,
                        readable: true,
                        edit: None,
                    },
                );
            }
            Record::Dirty(key) => {
                let edit = Some(self.next_edit);
                self.next_edit += 1;
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.edit = edit;
                } else {
                    self.entries.put(
                        key,
                        Entry {
                            length: 0,
                            readable: false,
                            edit,
                        },
                    );
                }
            }
            Record::Remove(key) => {
                self.entries.pop(&key);
            }
            Record::Read(key) => {
                self.entries.get(&key);
            }
        }
    }

    /// Drop entries whose edit never finished and total the rest.
    fn process_journal(&mut self) -> Result<()> {
        let mut size = 0;
        let mut unfinished = Vec::new();
        for (key, entry) in self.entries.iter() {
            if entry.edit.is_some() {
                unfinished.push(key.clone());
            } else {
                size += entry.length;
            }
        }
        for key in unfinished {
            self.entries.pop(&key);
            remove_if_exists(&self.clean_path(&key))?;
            remove_if_exists(&self.tmp_path(&key))?;
        }
        remove_if_exists(&self.directory.join(JOURNAL_TMP))?;
        self.size = size;
        Ok(())
    }

    /// Write a compact journal, replacing the current one atomically.
    fn rebuild_journal(&mut self) -> Result<()> {
        if let Some(mut writer) = self.journal.take() {
            writer.flush()?;
        }

        let tmp_path = self.directory.join(JOURNAL_TMP);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            journal::write_header(&mut writer, self.app_version)?;
            // least recently used first, so replay restores the order
            for (key, entry) in self.entries.iter().rev() {
                let record = if entry.edit.is_some() {
                    Record::Dirty(key.clone())
                } else {
                    Record::Clean(key.clone(), entry.length)
                };
                writeln!(writer, "{record}")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let journal_path = self.journal_path();
        let backup_path = self.directory.join(JOURNAL_BACKUP);
        if journal_path.exists() {
            fs::rename(&journal_path, &backup_path)?;
        }
        fs::rename(&tmp_path, &journal_path)?;
        remove_if_exists(&backup_path)?;

        self.journal = Some(open_append(&journal_path)?);
        self.redundant_ops = 0;
        Ok(())
    }

    fn journal_needs_rebuild(&self) -> bool {
        self.redundant_ops >= COMPACT_THRESHOLD && self.redundant_ops >= self.entries.len()
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        let writer = self.journal.as_mut().ok_or(CacheError::Closed)?;
        writeln!(writer, "{record}")?;
        Ok(())
    }

    fn flush_journal(&mut self) -> Result<()> {
        if let Some(writer) = self.journal.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Finish an edit: `Some(len)` commits the temp file, `None` abandons it.
    pub(crate) fn complete_edit(
        &mut self,
        key: &str,
        edit_id: u64,
        committed: Option<u64>,
    ) -> Result<()> {
        let tmp_path = self.tmp_path(key);
        let Some(entry) = self
            .entries
            .peek(key)
            .copied()
            .filter(|e| e.edit == Some(edit_id))
        else {
            // cleared or closed underneath the editor
            remove_if_exists(&tmp_path)?;
            return if committed.is_some() {
                Err(CacheError::Closed)
            } else {
                Ok(())
            };
        };

        if self.journal.is_none() {
            remove_if_exists(&tmp_path)?;
            if let Some(e) = self.entries.peek_mut(key) {
                e.edit = None;
            }
            return if committed.is_some() {
                Err(CacheError::Closed)
            } else {
                Ok(())
            };
        }

        let outcome = match committed {
            Some(length) => match fs::rename(&tmp_path, self.clean_path(key)) {
                Ok(()) => {
                    let old = if entry.readable { entry.length } else { 0 };
                    self.size = self.size - old + length;
                    self.entries.put(
                        key.to_string(),
                        Entry {
                            length,
                            readable: true,
                            edit: None,
                        },
                    );
                    self.append(&Record::Clean(key.to_string(), length))?;
                    Ok(())
                }
                Err(e) => {
                    self.abandon_edit(key, entry, &tmp_path)?;
                    Err(e.into())
                }
            },
            None => self.abandon_edit(key, entry, &tmp_path),
        };

        self.redundant_ops += 1;
        self.flush_journal()?;
        self.trim_to_size()?;
        if self.journal_needs_rebuild() {
            self.rebuild_journal()?;
        }
        outcome
    }

    fn abandon_edit(&mut self, key: &str, entry: Entry, tmp_path: &Path) -> Result<()> {
        remove_if_exists(tmp_path)?;
        if entry.readable {
            if let Some(e) = self.entries.peek_mut(key) {
                e.edit = None;
            }
            self.append(&Record::Clean(key.to_string(), entry.length))
        } else {
            self.entries.pop(key);
            self.append(&Record::Remove(key.to_string()))
        }
    }

    /// Remove a committed entry that is not being written.
    fn remove_entry(&mut self, key: &str) -> Result<bool> {
        match self.entries.peek(key) {
            Some(entry) if entry.edit.is_none() => {}
            _ => return Ok(false),
        }
        let Some(entry) = self.entries.pop(key) else {
            return Ok(false);
        };
        remove_if_exists(&self.clean_path(key))?;
        if entry.readable {
            self.size -= entry.length;
        }
        self.redundant_ops += 1;
        self.append(&Record::Remove(key.to_string()))?;
        Ok(true)
    }

    fn trim_to_size(&mut self) -> Result<()> {
        while self.size > self.max_size {
            let victim = self
                .entries
                .iter()
                .rev()
                .find(|(_, e)| e.readable && e.edit.is_none())
                .map(|(k, _)| k.clone());
            let Some(key) = victim else {
                break;
            };
            tracing::debug!("Evicting {key} from disk cache");
            self.remove_entry(&key)?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new().append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn write(cache: &DiskLruCache, key: &str, data: &[u8]) {
        let mut editor = cache.edit(key).unwrap().unwrap();
        editor.write_all(data).unwrap();
        editor.commit().unwrap();
    }

    fn read(cache: &DiskLruCache, key: &str) -> Option<Vec<u8>> {
        cache.get(key).unwrap().map(|s| s.read_all().unwrap())
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        write(&cache, "abc", b"hello");

        let mut snapshot = cache.get("abc").unwrap().unwrap();
        assert_eq!(snapshot.len(), 5);
        let mut out = Vec::new();
        snapshot.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_uncommitted_write_is_invisible() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();

        let mut editor = cache.edit("abc").unwrap().unwrap();
        editor.write_all(b"partial").unwrap();
        assert!(cache.get("abc").unwrap().is_none());
        assert!(dir.path().join("abc.0.tmp").exists());
        drop(editor);

        assert!(cache.get("abc").unwrap().is_none());
        assert!(!dir.path().join("abc.0.tmp").exists());
        assert!(!dir.path().join("abc.0").exists());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_abort_keeps_previous_value() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        write(&cache, "abc", b"first");

        let mut editor = cache.edit("abc").unwrap().unwrap();
        editor.write_all(b"second!").unwrap();
        editor.abort().unwrap();

        assert_eq!(read(&cache, "abc").unwrap(), b"first");
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_single_editor_per_key() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        let editor = cache.edit("abc").unwrap().unwrap();
        assert!(cache.edit("abc").unwrap().is_none());
        assert!(cache.edit("def").unwrap().is_some());
        drop(editor);
        assert!(cache.edit("abc").unwrap().is_some());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 10).unwrap();
        write(&cache, "a", b"aaaa");
        write(&cache, "b", b"bbbb");
        assert!(read(&cache, "a").is_some());
        write(&cache, "c", b"cccc");

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.size(), 8);
        assert!(!dir.path().join("b.0").exists());
    }

    #[test]
    fn test_entry_larger_than_budget_is_evicted() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 4).unwrap();
        write(&cache, "big", b"0123456789");
        assert!(!cache.contains("big"));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_reopen_restores_entries_and_order() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 12).unwrap();
            write(&cache, "a", b"aaaa");
            write(&cache, "b", b"bbbb");
            write(&cache, "c", b"cccc");
            read(&cache, "a");
            cache.close().unwrap();
        }

        let cache = DiskLruCache::open(dir.path(), 1, 12).unwrap();
        assert_eq!(cache.size(), 12);
        assert_eq!(read(&cache, "c").unwrap(), b"cccc");
        // b is now least recently used
        write(&cache, "d", b"dddd");
        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
    }

    #[test]
    fn test_unfinished_edit_is_dropped_on_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            write(&cache, "a", b"aaaa");
            let mut editor = cache.edit("b").unwrap().unwrap();
            editor.write_all(b"bbbb").unwrap();
            // simulate a crash: the editor never completes
            std::mem::forget(editor);
        }

        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(!dir.path().join("b.0.tmp").exists());
        assert_eq!(cache.size(), 4);
    }

    #[test]
    fn test_corrupt_journal_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(JOURNAL), "not a journal\n").unwrap();
        let err = DiskLruCache::open(dir.path(), 1, 1024).err().unwrap();
        assert!(matches!(err, CacheError::JournalCorrupt(_)));
    }

    #[test]
    fn test_app_version_mismatch_is_corrupt() {
        let dir = tempdir().unwrap();
        DiskLruCache::open(dir.path(), 1, 1024).unwrap().close().unwrap();
        let err = DiskLruCache::open(dir.path(), 2, 1024).err().unwrap();
        assert!(matches!(err, CacheError::JournalCorrupt(_)));
    }

    #[test]
    fn test_truncated_tail_is_tolerated() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            write(&cache, "a", b"aaaa");
            cache.close().unwrap();
        }
        let mut journal = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL))
            .unwrap();
        journal.write_all(b"CLEAN b 1").unwrap();
        drop(journal);

        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        let text = fs::read_to_string(dir.path().join(JOURNAL)).unwrap();
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_backup_journal_is_restored() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
            write(&cache, "a", b"aaaa");
            cache.close().unwrap();
        }
        fs::rename(dir.path().join(JOURNAL), dir.path().join(JOURNAL_BACKUP)).unwrap();

        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert_eq!(read(&cache, "a").unwrap(), b"aaaa");
        assert!(!dir.path().join(JOURNAL_BACKUP).exists());
    }

    #[test]
    fn test_journal_compaction() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        write(&cache, "a", b"aaaa");
        for _ in 0..(COMPACT_THRESHOLD + 10) {
            read(&cache, "a");
        }
        cache.flush().unwrap();
        let text = fs::read_to_string(dir.path().join(JOURNAL)).unwrap();
        assert!(text.lines().count() < 100, "journal was not compacted");

        drop(cache);
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        assert_eq!(read(&cache, "a").unwrap(), b"aaaa");
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        write(&cache, "a", b"aaaa");
        write(&cache, "b", b"bbbb");

        assert!(cache.remove("a").unwrap());
        assert!(!cache.remove("a").unwrap());
        assert_eq!(cache.size(), 4);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(!dir.path().join("b.0").exists());
        write(&cache, "c", b"cc");
        assert_eq!(read(&cache, "c").unwrap(), b"cc");
    }

    #[test]
    fn test_editor_from_before_clear_cannot_commit() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        let mut stale = cache.edit("a").unwrap().unwrap();
        stale.write_all(b"old").unwrap();
        cache.clear().unwrap();

        assert!(stale.commit().is_err());
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_closed_cache_rejects_operations() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        cache.close().unwrap();
        assert!(cache.is_closed());
        assert!(matches!(cache.get("a"), Err(CacheError::Closed)));
        assert!(matches!(cache.edit("a"), Err(CacheError::Closed)));
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        let long = "a".repeat(121);
        for key in ["", "UPPER", "has space", "../escape", long.as_str()] {
            assert!(matches!(cache.get(key), Err(CacheError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_missing_blob_drops_entry() {
        let dir = tempdir().unwrap();
        let cache = DiskLruCache::open(dir.path(), 1, 1024).unwrap();
        write(&cache, "a", b"aaaa");
        fs::remove_file(dir.path().join("a.0")).unwrap();
        assert!(cache.get("a").unwrap().is_none());
        assert_eq!(cache.size(), 0);
    }
}
