//! Write transactions and read handles for the disk store.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

use super::lru::{Shared, lock};
use crate::error::{CacheError, Result};

/// Scoped write transaction for one blob.
///
/// Bytes go to a temporary file. Nothing becomes visible until
/// [`commit`](Self::commit); dropping the editor without committing abandons
/// the write.
pub struct Editor {
    cache: Shared,
    key: String,
    edit_id: u64,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl Editor {
    pub(crate) fn new(cache: Shared, key: String, edit_id: u64, file: File) -> Self {
        Self {
            cache,
            key,
            edit_id,
            writer: Some(BufWriter::new(file)),
            written: 0,
        }
    }

    /// Key being written
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Sync the temporary file and publish it.
    pub fn commit(mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(CacheError::Closed);
        };
        let synced = writer
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
            .and_then(|file| file.sync_all());

        let mut inner = lock(&self.cache);
        match synced {
            Ok(()) => inner.complete_edit(&self.key, self.edit_id, Some(self.written)),
            Err(e) => {
                inner.complete_edit(&self.key, self.edit_id, None)?;
                Err(e.into())
            }
        }
    }

    /// Abandon the write, keeping any previously committed blob.
    pub fn abort(mut self) -> Result<()> {
        self.finish_aborted()
    }

    fn finish_aborted(&mut self) -> Result<()> {
        if self.writer.take().is_none() {
            return Ok(());
        }
        lock(&self.cache).complete_edit(&self.key, self.edit_id, None)
    }
}

impl Write for Editor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("editor already finished"))?;
        let n = writer.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if let Err(e) = self.finish_aborted() {
            tracing::warn!("Failed to abandon disk cache write for {}: {e}", self.key);
        }
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("key", &self.key)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

/// Read handle for a committed blob.
///
/// The file was opened while the entry was live, so the handle stays valid
/// even if the entry is evicted while it is being read.
pub struct Snapshot {
    key: String,
    length: u64,
    reader: BufReader<File>,
}

impl Snapshot {
    pub(crate) fn new(key: &str, length: u64, file: File) -> Self {
        Self {
            key: key.to_string(),
            length,
            reader: BufReader::new(file),
        }
    }

    /// Key of the blob
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Committed length in bytes
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the blob is empty
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Read the whole blob.
    pub fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(usize::try_from(self.length).unwrap_or(0));
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for Snapshot {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("key", &self.key)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
