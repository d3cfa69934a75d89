//! Entry classification from a bounded content prefix.

pub mod mime;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::event::EntryKind;

/// Default sniff window in bytes.
pub const DEFAULT_SNIFF_BYTES: usize = 8000;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Kind and mime type of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: EntryKind,
    pub mime_type: String,
}

/// Classifies files as text or binary and sniffs their mime type.
#[derive(Debug, Clone)]
pub struct EntryClassifier {
    sniff_bytes: usize,
}

impl Default for EntryClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SNIFF_BYTES)
    }
}

impl EntryClassifier {
    pub fn new(sniff_bytes: usize) -> Self {
        Self {
            sniff_bytes: sniff_bytes.max(1),
        }
    }

    pub fn sniff_bytes(&self) -> usize {
        self.sniff_bytes
    }

    /// Classify from already-loaded content; only the sniff window is inspected.
    pub fn classify_bytes(&self, content: &[u8]) -> Classification {
        let prefix = &content[..content.len().min(self.sniff_bytes)];
        let truncated = content.len() > prefix.len();
        let kind = if is_binary(prefix, truncated) {
            EntryKind::Binary
        } else {
            EntryKind::File
        };
        Classification {
            kind,
            mime_type: mime::sniff(prefix).to_string(),
        }
    }

    /// Classify a file by reading at most the sniff window.
    pub fn classify_path(&self, path: &Path) -> Result<Classification, ClassifyError> {
        let read_err = |source| ClassifyError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;
        // one extra byte tells a full window apart from a short file
        let mut prefix = Vec::with_capacity(self.sniff_bytes + 1);
        file.take(self.sniff_bytes as u64 + 1)
            .read_to_end(&mut prefix)
            .map_err(read_err)?;
        Ok(self.classify_bytes(&prefix))
    }
}

/// A prefix is binary when it holds a NUL byte or invalid UTF-8.
///
/// When the prefix was cut from a longer file, a multi-byte character split
/// at the window edge does not count as invalid.
pub fn is_binary(prefix: &[u8], truncated: bool) -> bool {
    if prefix.contains(&0) {
        return true;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => false,
        Err(e) => !(truncated && e.error_len().is_none()),
    }
}
