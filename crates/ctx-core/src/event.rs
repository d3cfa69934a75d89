//! The producer→consumer wire protocol.
//!
//! The traversal engine emits a single ordered sequence of [`Event`]s per
//! invocation. Renderers fold over that sequence; nothing in here knows about
//! output encodings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Classification of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Text file (valid UTF-8 prefix, no NUL bytes).
    File,
    Directory,
    /// File whose prefix is not valid UTF-8 or contains a NUL byte.
    Binary,
}

impl EntryKind {
    /// The schema name (`type` field) of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Binary => "binary",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file, binary, or directory record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Final path component.
    pub name: String,
    pub kind: EntryKind,
    /// Sniffed mime type; empty for directories.
    pub mime_type: String,
    /// Size in bytes from filesystem metadata (0 for directories).
    pub size: u64,
    pub modified_at: Option<SystemTime>,
    /// Token count; 0 when counting is disabled or degraded.
    pub tokens: u64,
    /// Tokenizer model, present only when `tokens > 0`.
    pub model: Option<String>,
}

impl Entry {
    /// Build a directory entry.
    pub fn directory(path: PathBuf, modified_at: Option<SystemTime>) -> Self {
        let name = display_name(&path);
        Self {
            path,
            name,
            kind: EntryKind::Directory,
            mime_type: String::new(),
            size: 0,
            modified_at,
            tokens: 0,
            model: None,
        }
    }

    /// Whether this entry is a file or binary (i.e. contributes to summaries).
    pub fn is_leaf(&self) -> bool {
        self.kind != EntryKind::Directory
    }
}

/// Final path component as a lossy string, falling back to the full path
/// for roots such as `/`.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Nested aggregate of a directory's post-exclusion descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_files: u64,
    pub total_size_bytes: u64,
    pub total_tokens: u64,
    pub token_model: Option<String>,
}

impl Summary {
    /// Add one file or binary entry.
    pub fn add_entry(&mut self, entry: &Entry) {
        self.total_files += 1;
        self.total_size_bytes += entry.size;
        self.total_tokens += entry.tokens;
        self.adopt_model(entry.model.as_deref(), entry.tokens);
    }

    /// Fold a closed child summary into this one.
    pub fn absorb(&mut self, child: &Summary) {
        self.total_files += child.total_files;
        self.total_size_bytes += child.total_size_bytes;
        self.total_tokens += child.total_tokens;
        self.adopt_model(child.token_model.as_deref(), child.total_tokens);
    }

    fn adopt_model(&mut self, model: Option<&str>, tokens: u64) {
        if self.token_model.is_none()
            && tokens > 0
            && let Some(model) = model.filter(|m| !m.is_empty())
        {
            self.token_model = Some(model.to_string());
        }
    }
}

/// How a [`ContentChunk`]'s bytes are to be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// UTF-8 text (chunk boundaries fall on character boundaries).
    Utf8,
    /// Raw bytes of a reveal-matched binary; renderers base64-encode them.
    Base64,
    /// Binary payload withheld; the chunk is empty and final.
    Omitted,
}

/// A slice of one file's content.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChunk {
    pub path: PathBuf,
    pub index: u32,
    pub data: Vec<u8>,
    pub encoding: ContentEncoding,
    pub is_final: bool,
}

/// Warning categories reported on the side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    FileUnreadable,
    DirectoryUnreadable,
    MetadataUnavailable,
    TokenCount,
    IgnoreFileUnreadable,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningCode::FileUnreadable => "file-unreadable",
            WarningCode::DirectoryUnreadable => "directory-unreadable",
            WarningCode::MetadataUnavailable => "metadata-unavailable",
            WarningCode::TokenCount => "token-count",
            WarningCode::IgnoreFileUnreadable => "ignore-file-unreadable",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem; the entry was omitted or degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub code: WarningCode,
    pub path: PathBuf,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning: {}: {}", self.path.display(), self.message)
    }
}

/// A failure that terminates the session.
#[derive(Debug, Clone, PartialEq)]
pub struct FatalError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}: {}", self.path.display(), self.message)
    }
}

/// One unit of the producer→consumer protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DirectoryEnter(Entry),
    DirectoryExit { path: PathBuf, summary: Summary },
    FileEntry(Entry),
    ContentChunk(ContentChunk),
    Warning(Warning),
    FatalError(FatalError),
}

impl Event {
    /// Short tag used in logs and test assertions.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::DirectoryEnter(_) => "enter",
            Event::DirectoryExit { .. } => "exit",
            Event::FileEntry(_) => "file",
            Event::ContentChunk(_) => "chunk",
            Event::Warning(_) => "warning",
            Event::FatalError(_) => "fatal",
        }
    }

    /// The path the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            Event::DirectoryEnter(entry) | Event::FileEntry(entry) => &entry.path,
            Event::DirectoryExit { path, .. } => path,
            Event::ContentChunk(chunk) => &chunk.path,
            Event::Warning(warning) => &warning.path,
            Event::FatalError(fatal) => &fatal.path,
        }
    }
}
