//! Journal record format.
//!
//! ```text
//! artcache.disk.journal
//! 1
//! 1
//! 1
//!
//! DIRTY 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! CLEAN 3400330d1dfc7f3f7f4b8d4d803dfcf6 8192
//! READ 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! REMOVE 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! ```
//!
//! The header carries the magic line, the format version, the application
//! version and the number of values per entry. Every later line is one
//! record; a CLEAN record carries the committed blob length.

use std::fmt;
use std::io::{self, Write};

use crate::error::{CacheError, Result};

pub(crate) const MAGIC: &str = "artcache.disk.journal";
pub(crate) const FORMAT_VERSION: &str = "1";
pub(crate) const VALUE_COUNT: &str = "1";

/// One line of the journal body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    /// An edit started
    Dirty(String),
    /// An edit committed `len` bytes
    Clean(String, u64),
    /// The entry was deleted
    Remove(String),
    /// The entry was read
    Read(String),
}

impl Record {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let corrupt = || CacheError::JournalCorrupt(format!("unexpected journal line: {line:?}"));
        let mut parts = line.split(' ');
        let op = parts.next().ok_or_else(corrupt)?;
        let key = parts.next().filter(|k| !k.is_empty()).ok_or_else(corrupt)?;
        let record = match op {
            "CLEAN" => {
                let len = parts
                    .next()
                    .and_then(|l| l.parse().ok())
                    .ok_or_else(corrupt)?;
                Self::Clean(key.to_string(), len)
            }
            "DIRTY" => Self::Dirty(key.to_string()),
            "REMOVE" => Self::Remove(key.to_string()),
            "READ" => Self::Read(key.to_string()),
            _ => return Err(corrupt()),
        };
        if parts.next().is_some() {
            return Err(corrupt());
        }
        Ok(record)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dirty(key) => write!(f, "DIRTY {key}"),
            Self::Clean(key, len) => write!(f, "CLEAN {key} {len}"),
            Self::Remove(key) => write!(f, "REMOVE {key}"),
            Self::Read(key) => write!(f, "READ {key}"),
        }
    }
}

pub(crate) fn write_header(w: &mut impl Write, app_version: u32) -> io::Result<()> {
    writeln!(w, "{MAGIC}")?;
    writeln!(w, "{FORMAT_VERSION}")?;
    writeln!(w, "{app_version}")?;
    writeln!(w, "{VALUE_COUNT}")?;
    writeln!(w)
}

/// Check the five header lines.
pub(crate) fn check_header(lines: &[&str], app_version: u32) -> Result<()> {
    let app = app_version.to_string();
    let expected = [MAGIC, FORMAT_VERSION, app.as_str(), VALUE_COUNT, ""];
    if lines.len() < expected.len() || lines[..expected.len()] != expected {
        return Err(CacheError::JournalCorrupt(format!(
            "unexpected journal header: {:?}",
            &lines[..lines.len().min(expected.len())]
        )));
    }
    Ok(())
}

/// Split journal text into complete lines.
///
/// Returns the lines and whether the final line was cut off (no trailing
/// newline), which happens when the process died mid-append.
pub(crate) fn split_lines(text: &str) -> (Vec<&str>, bool) {
    let truncated = !text.is_empty() && !text.ends_with('\n');
    let mut lines: Vec<&str> = text.split('\n').collect();
    // split leaves either "" after the final newline or the partial line
    lines.pop();
    (lines, truncated)
}
